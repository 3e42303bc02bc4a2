//! Framing decisions and the response sink abstraction.
//!
//! The framer decides status and headers exactly once per request. For a
//! streamed response the head goes out before any outcome is known and is
//! frozen from then on; later failures can only surface inside chunk
//! bodies, never by amending the status line.

use std::io;

use spindle_core::CallOutcome;

use crate::request::BATCH_MODE_HEADER;

/// Status code for a buffered batch containing at least one failure.
///
/// A mixed batch has no single honest per-call code, so the framer reports
/// a coarse multi-status and leaves the specifics to the per-call
/// envelopes.
pub(crate) const MULTI_STATUS: u16 = 207;

/// The response status line and header set, decided once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// HTTP-equivalent status code.
    pub status: u16,
    /// Response headers, in emission order.
    pub headers: Vec<(String, String)>,
    /// Whether the body follows as self-delimiting chunks.
    pub streaming: bool,
}

/// Where response bytes go.
///
/// The pipeline is decoupled from any transport's stream primitive through
/// this sink; `spindled` implements it over a socket, tests implement it
/// over byte buffers. Write failures after a peer disconnect are expected
/// and must be tolerated by callers (the pipeline swallows them).
pub trait ResponseSink {
    /// Sends the status line and headers.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport rejects the write.
    fn send_head(&mut self, head: &ResponseHead) -> io::Result<()>;

    /// Sends a complete buffered body.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport rejects the write.
    fn send_body(&mut self, body: &str) -> io::Result<()>;

    /// Sends one streamed frame.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport rejects the write.
    fn send_frame(&mut self, frame: &str) -> io::Result<()>;

    /// Finishes the exchange.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport rejects the final write.
    fn close(&mut self) -> io::Result<()>;
}

/// Builds the head for a buffered response.
pub(crate) fn buffered_head(status: u16, extra: Vec<(String, String)>) -> ResponseHead {
    let mut headers = vec![("Content-Type".to_owned(), "application/json".to_owned())];
    headers.extend(extra);
    ResponseHead {
        status,
        headers,
        streaming: false,
    }
}

/// Builds the head for a streamed response. The status is frozen at 200
/// before any outcome is known.
pub(crate) fn streaming_head(extra: Vec<(String, String)>) -> ResponseHead {
    let mut headers = vec![
        ("Content-Type".to_owned(), "application/json".to_owned()),
        ("Transfer-Encoding".to_owned(), "chunked".to_owned()),
        ("Vary".to_owned(), BATCH_MODE_HEADER.to_owned()),
    ];
    headers.extend(extra);
    ResponseHead {
        status: 200,
        headers,
        streaming: true,
    }
}

/// Computes the buffered status code from the collected outcomes.
///
/// A single call reports its own mapped code; a batch reports 200 when
/// everything succeeded and the coarse [`MULTI_STATUS`] otherwise.
pub(crate) fn overall_status(outcomes: &[CallOutcome], batched: bool) -> u16 {
    if batched {
        if outcomes.iter().all(CallOutcome::is_success) {
            200
        } else {
            MULTI_STATUS
        }
    } else {
        outcomes
            .first()
            .and_then(CallOutcome::error_status)
            .unwrap_or(200)
    }
}
