//! Minimal HTTP/1.1 surface over a connection stream.
//!
//! One connection carries one exchange: a bounded request head, an optional
//! `Content-Length` body, and a response that is either buffered (with a
//! computed `Content-Length`) or chunk-encoded when the engine streams.
//! This is deliberately not a general-purpose HTTP implementation; it is
//! the smallest surface the resolution engine needs to be reachable.

use std::io::{self, Read, Write};

use thiserror::Error;
use tracing::warn;
use url::form_urlencoded;

use spindle_http::{ResponseHead, ResponseSink, RpcRequest};

use crate::transport::ConnectionStream;

const HTTP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::http");

/// Maximum size of a request head in bytes.
const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Maximum size of a request body in bytes.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Errors surfaced while reading or parsing an HTTP exchange.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The request head could not be parsed.
    #[error("malformed request: {message}")]
    Malformed {
        /// What was wrong with it.
        message: String,
    },

    /// The request exceeded a size limit.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    TooLarge {
        /// Observed size so far.
        size: usize,
        /// The enforced limit.
        max_size: usize,
    },

    /// IO error during read.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl HttpError {
    fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// The status code reported back for this failure.
    pub(crate) const fn status(&self) -> u16 {
        match self {
            Self::Malformed { .. } | Self::Io(_) => 400,
            Self::TooLarge { .. } => 413,
        }
    }
}

/// Reads one HTTP request and lowers it to the engine's request shape.
///
/// Returns `Ok(None)` when the client disconnects before sending anything.
pub(crate) fn read_request(
    stream: &mut ConnectionStream,
    endpoint: &str,
) -> Result<Option<RpcRequest>, HttpError> {
    let Some((head, leftover)) = read_head(stream)? else {
        return Ok(None);
    };
    let text = String::from_utf8_lossy(&head);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let (method, target) = parse_request_line(request_line)?;

    let mut headers = Vec::new();
    for line in lines.filter(|line| !line.is_empty()) {
        let Some((name, value)) = line.split_once(':') else {
            return Err(HttpError::malformed(format!("invalid header line: {line}")));
        };
        headers.push((name.trim().to_owned(), value.trim().to_owned()));
    }

    let content_length = declared_content_length(&headers)?;
    if content_length > MAX_BODY_BYTES {
        return Err(HttpError::TooLarge {
            size: content_length,
            max_size: MAX_BODY_BYTES,
        });
    }
    let body = read_body(stream, leftover, content_length)?;

    let (pathname, query_text) = match target.split_once('?') {
        Some((pathname, query)) => (pathname, query),
        None => (target, ""),
    };
    let query: Vec<(String, String)> = form_urlencoded::parse(query_text.as_bytes())
        .into_owned()
        .collect();

    Ok(Some(RpcRequest {
        method: method.to_owned(),
        path: rpc_path(pathname, endpoint),
        query,
        headers,
        body,
    }))
}

/// Writes a plain-text error response for a failure that preceded the
/// engine. Write failures are swallowed: the peer is likely gone already.
pub(crate) fn write_error_response(stream: &mut ConnectionStream, error: &HttpError) {
    let status = error.status();
    let body = format!("{error}\n");
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/plain\r\nContent-Length: {length}\r\nConnection: close\r\n\r\n{body}",
        reason = reason_phrase(status),
        length = body.len(),
    );
    if let Err(error) = stream.write_all(response.as_bytes()).and_then(|()| stream.flush()) {
        warn!(target: HTTP_TARGET, %error, "failed to write error response");
    }
}

fn parse_request_line(line: &str) -> Result<(&str, &str), HttpError> {
    let mut parts = line.split_whitespace();
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(HttpError::malformed(format!("invalid request line: {line}")));
    };
    if !version.starts_with("HTTP/") {
        return Err(HttpError::malformed(format!("invalid version: {version}")));
    }
    Ok((method, target))
}

fn declared_content_length(headers: &[(String, String)]) -> Result<usize, HttpError> {
    let Some((_, value)) = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
    else {
        return Ok(0);
    };
    value
        .parse()
        .map_err(|_| HttpError::malformed(format!("invalid content-length: {value}")))
}

/// Reads until the blank line ending the head; returns the head bytes and
/// whatever body bytes arrived with the final chunk.
fn read_head(stream: &mut ConnectionStream) -> Result<Option<(Vec<u8>, Vec<u8>)>, HttpError> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let bytes_read = read_with_retry(stream, &mut chunk)?;
        if bytes_read == 0 {
            if buffer.is_empty() {
                return Ok(None);
            }
            return Err(HttpError::malformed("truncated request head"));
        }
        buffer.extend_from_slice(chunk.get(..bytes_read).unwrap_or_default());
        if buffer.len() > MAX_HEAD_BYTES {
            return Err(HttpError::TooLarge {
                size: buffer.len(),
                max_size: MAX_HEAD_BYTES,
            });
        }
        if let Some(position) = find_blank_line(&buffer) {
            let leftover = buffer.split_off(position + 4);
            buffer.truncate(position);
            return Ok(Some((buffer, leftover)));
        }
    }
}

fn read_body(
    stream: &mut ConnectionStream,
    leftover: Vec<u8>,
    content_length: usize,
) -> Result<Vec<u8>, HttpError> {
    let mut body = leftover;
    let mut chunk = [0_u8; 1024];
    while body.len() < content_length {
        let bytes_read = read_with_retry(stream, &mut chunk)?;
        if bytes_read == 0 {
            return Err(HttpError::malformed("truncated request body"));
        }
        body.extend_from_slice(chunk.get(..bytes_read).unwrap_or_default());
    }
    body.truncate(content_length);
    Ok(body)
}

/// Reads from the stream, retrying on interrupts.
fn read_with_retry(stream: &mut ConnectionStream, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match stream.read(buf) {
            Ok(bytes_read) => return Ok(bytes_read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
}

fn find_blank_line(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

/// Strips the endpoint mount prefix and surrounding slashes from a request
/// path.
fn rpc_path(pathname: &str, endpoint: &str) -> String {
    let trimmed = trim_slashes(pathname);
    let endpoint = trim_slashes(endpoint);
    let rest = trimmed.strip_prefix(endpoint).unwrap_or(trimmed);
    trim_slashes(rest).to_owned()
}

fn trim_slashes(path: &str) -> &str {
    path.trim_start_matches('/').trim_end_matches('/')
}

/// The reason phrase paired with each status the engine emits.
pub(crate) const fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        207 => "Multi-Status",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        422 => "Unprocessable Content",
        429 => "Too Many Requests",
        499 => "Client Closed Request",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Sink writing engine responses as HTTP/1.1.
///
/// Buffered heads are held back until the body arrives so the
/// `Content-Length` can be computed; streaming heads go out immediately and
/// every frame is wrapped in one transfer-encoding chunk.
pub(crate) struct HttpResponseSink<'a> {
    stream: &'a mut ConnectionStream,
    pending: Option<ResponseHead>,
    streaming: bool,
}

impl<'a> HttpResponseSink<'a> {
    pub(crate) fn new(stream: &'a mut ConnectionStream) -> Self {
        Self {
            stream,
            pending: None,
            streaming: false,
        }
    }

    fn write_head(&mut self, head: &ResponseHead, content_length: Option<usize>) -> io::Result<()> {
        write!(
            self.stream,
            "HTTP/1.1 {} {}\r\n",
            head.status,
            reason_phrase(head.status)
        )?;
        for (name, value) in &head.headers {
            write!(self.stream, "{name}: {value}\r\n")?;
        }
        if let Some(length) = content_length {
            write!(self.stream, "Content-Length: {length}\r\n")?;
        }
        self.stream.write_all(b"Connection: close\r\n\r\n")
    }
}

impl ResponseSink for HttpResponseSink<'_> {
    fn send_head(&mut self, head: &ResponseHead) -> io::Result<()> {
        if head.streaming {
            self.streaming = true;
            self.write_head(head, None)?;
            return self.stream.flush();
        }
        self.pending = Some(head.clone());
        Ok(())
    }

    fn send_body(&mut self, body: &str) -> io::Result<()> {
        let head = self.pending.take().unwrap_or_else(|| ResponseHead {
            status: 200,
            headers: vec![("Content-Type".to_owned(), "application/json".to_owned())],
            streaming: false,
        });
        self.write_head(&head, Some(body.len()))?;
        self.stream.write_all(body.as_bytes())?;
        self.stream.flush()
    }

    fn send_frame(&mut self, frame: &str) -> io::Result<()> {
        write!(self.stream, "{:x}\r\n", frame.len())?;
        self.stream.write_all(frame.as_bytes())?;
        self.stream.write_all(b"\r\n")?;
        self.stream.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        if self.streaming {
            self.stream.write_all(b"0\r\n\r\n")?;
        }
        self.stream.flush()
    }
}
