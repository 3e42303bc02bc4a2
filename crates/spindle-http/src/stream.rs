//! The streaming chunk protocol.
//!
//! A streamed response body is one JSON object keyed by stringified call
//! index, written incrementally: the first outcome opens the object, every
//! outcome ends with a newline so a client can decode frame-by-frame
//! without knowing the total count, and a terminal `}` closes the object
//! after the last outcome. Frames are written in completion order; the
//! embedded index carries the correlation back to request order.
//!
//! The formatter is an explicit state machine
//! (`idle → headers-sent → emitting → closed`) over an injectable
//! [`ResponseSink`]. Once the peer is gone there is no channel left to
//! report a write failure through, so failures are swallowed, logged, and
//! collapse the state to closed.

use tracing::warn;

use crate::framer::{ResponseHead, ResponseSink};

const STREAM_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::stream");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Idle,
    HeadersSent,
    Emitting,
    Closed,
}

/// Encodes completed outcomes as self-delimiting frames on a sink.
pub struct StreamFormatter<'a> {
    sink: &'a mut dyn ResponseSink,
    state: StreamState,
}

impl<'a> StreamFormatter<'a> {
    /// Creates an idle formatter over the given sink.
    pub fn new(sink: &'a mut dyn ResponseSink) -> Self {
        Self {
            sink,
            state: StreamState::Idle,
        }
    }

    /// Sends the response head. Only meaningful while idle.
    pub fn send_head(&mut self, head: &ResponseHead) {
        if self.state != StreamState::Idle {
            return;
        }
        match self.sink.send_head(head) {
            Ok(()) => self.state = StreamState::HeadersSent,
            Err(error) => {
                warn!(target: STREAM_TARGET, %error, "failed to send stream head");
                self.state = StreamState::Closed;
            }
        }
    }

    /// Emits one outcome frame tagged with its call index.
    ///
    /// Frames arriving after the stream closed (for example because the
    /// peer disconnected) are dropped.
    pub fn emit(&mut self, index: i32, payload: &str) {
        let frame = match self.state {
            StreamState::Idle => {
                warn!(target: STREAM_TARGET, index, "dropping frame emitted before head");
                return;
            }
            StreamState::HeadersSent => format!("{{\"{index}\":{payload}\n"),
            StreamState::Emitting => format!(",\"{index}\":{payload}\n"),
            StreamState::Closed => return,
        };
        match self.sink.send_frame(&frame) {
            Ok(()) => self.state = StreamState::Emitting,
            Err(error) => {
                warn!(target: STREAM_TARGET, %error, index, "failed to write stream frame");
                self.state = StreamState::Closed;
            }
        }
    }

    /// Writes the terminal frame and closes the sink.
    ///
    /// Idempotent: the terminal frame is written exactly once, after the
    /// last real frame.
    pub fn finish(&mut self) {
        let terminal = match self.state {
            StreamState::Idle | StreamState::Closed => None,
            StreamState::HeadersSent => Some("{}"),
            StreamState::Emitting => Some("}"),
        };
        if let Some(terminal) = terminal {
            if let Err(error) = self.sink.send_frame(terminal) {
                warn!(target: STREAM_TARGET, %error, "failed to write terminal frame");
            }
            if let Err(error) = self.sink.close() {
                warn!(target: STREAM_TARGET, %error, "failed to close stream");
            }
        }
        self.state = StreamState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use crate::framer::streaming_head;

    use super::*;

    /// Sink recording every call; optionally failing all writes.
    #[derive(Default)]
    struct RecordingSink {
        head: Option<ResponseHead>,
        frames: Vec<String>,
        closed: usize,
        fail_writes: bool,
    }

    impl ResponseSink for RecordingSink {
        fn send_head(&mut self, head: &ResponseHead) -> io::Result<()> {
            if self.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
            }
            self.head = Some(head.clone());
            Ok(())
        }

        fn send_body(&mut self, _body: &str) -> io::Result<()> {
            Ok(())
        }

        fn send_frame(&mut self, frame: &str) -> io::Result<()> {
            if self.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
            }
            self.frames.push(frame.to_owned());
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            self.closed += 1;
            Ok(())
        }
    }

    #[test]
    fn frames_form_an_incrementally_parseable_object() {
        let mut sink = RecordingSink::default();
        let mut formatter = StreamFormatter::new(&mut sink);
        formatter.send_head(&streaming_head(Vec::new()));
        formatter.emit(1, r#"{"ok":true,"data":"b"}"#);
        formatter.emit(0, r#"{"ok":true,"data":"a"}"#);
        formatter.finish();

        assert_eq!(
            sink.frames,
            vec![
                "{\"1\":{\"ok\":true,\"data\":\"b\"}\n".to_owned(),
                ",\"0\":{\"ok\":true,\"data\":\"a\"}\n".to_owned(),
                "}".to_owned(),
            ]
        );
        let body: serde_json::Value =
            serde_json::from_str(&sink.frames.concat()).expect("concatenated frames parse");
        assert_eq!(body["0"]["data"], "a");
        assert_eq!(body["1"]["data"], "b");
        assert_eq!(sink.closed, 1);
    }

    #[test]
    fn head_precedes_all_frames_and_terminal_is_written_once() {
        let mut sink = RecordingSink::default();
        let mut formatter = StreamFormatter::new(&mut sink);
        formatter.send_head(&streaming_head(Vec::new()));
        formatter.emit(0, "{\"ok\":true,\"data\":null}");
        formatter.finish();
        formatter.finish();

        assert!(sink.head.is_some());
        assert_eq!(sink.frames.iter().filter(|frame| *frame == "}").count(), 1);
        assert_eq!(sink.closed, 1);
    }

    #[test]
    fn empty_streams_terminate_with_an_empty_object() {
        let mut sink = RecordingSink::default();
        let mut formatter = StreamFormatter::new(&mut sink);
        formatter.send_head(&streaming_head(Vec::new()));
        formatter.finish();
        assert_eq!(sink.frames, vec!["{}".to_owned()]);
    }

    #[test]
    fn frames_before_head_are_dropped() {
        let mut sink = RecordingSink::default();
        let mut formatter = StreamFormatter::new(&mut sink);
        formatter.emit(0, "{}");
        assert!(sink.frames.is_empty());
    }

    #[test]
    fn write_failures_are_swallowed_and_close_the_stream() {
        let mut sink = RecordingSink {
            fail_writes: true,
            ..RecordingSink::default()
        };
        let mut formatter = StreamFormatter::new(&mut sink);
        formatter.send_head(&streaming_head(Vec::new()));
        formatter.emit(0, "{}");
        formatter.finish();
        assert!(sink.frames.is_empty());
        assert_eq!(sink.closed, 0);
    }
}
