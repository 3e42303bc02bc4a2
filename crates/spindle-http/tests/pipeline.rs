//! End-to-end pipeline behavior: one request in, framed response out.

use std::io;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use serde_json::{Value, json};

use spindle_core::{
    ErrorEvent, ErrorInterceptor, Proceed, Procedure, ProcedureError, Router,
};
use spindle_http::{
    BATCH_MODE_HEADER, BATCH_MODE_STREAM, ResolveOptions, ResponseHead, ResponseSink, RpcRequest,
    resolve_request,
};

/// Everything the pipeline pushed through the sink, in order.
#[derive(Debug, PartialEq, Eq)]
enum SinkEvent {
    Head { status: u16, streaming: bool },
    Body(String),
    Frame(String),
    Close,
}

#[derive(Default)]
struct RecordingSink {
    events: Vec<SinkEvent>,
    headers: Vec<(String, String)>,
}

impl RecordingSink {
    fn head(&self) -> Option<(u16, bool)> {
        self.events.iter().find_map(|event| match event {
            SinkEvent::Head { status, streaming } => Some((*status, *streaming)),
            _ => None,
        })
    }

    fn body(&self) -> Option<Value> {
        self.events.iter().find_map(|event| match event {
            SinkEvent::Body(body) => serde_json::from_str(body).ok(),
            _ => None,
        })
    }

    fn frames(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Frame(frame) => Some(frame.as_str()),
                _ => None,
            })
            .collect()
    }

    fn stream_body(&self) -> Value {
        let text: String = self.frames().concat();
        serde_json::from_str(&text).expect("concatenated frames parse as JSON")
    }
}

impl ResponseSink for RecordingSink {
    fn send_head(&mut self, head: &ResponseHead) -> io::Result<()> {
        self.headers = head.headers.clone();
        self.events.push(SinkEvent::Head {
            status: head.status,
            streaming: head.streaming,
        });
        Ok(())
    }

    fn send_body(&mut self, body: &str) -> io::Result<()> {
        self.events.push(SinkEvent::Body(body.to_owned()));
        Ok(())
    }

    fn send_frame(&mut self, frame: &str) -> io::Result<()> {
        self.events.push(SinkEvent::Frame(frame.to_owned()));
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.events.push(SinkEvent::Close);
        Ok(())
    }
}

fn app_router() -> Router<()> {
    Router::builder()
        .procedure(
            "user.get",
            Procedure::query(|_, _| Ok(json!({"name": "a"}))),
        )
        .expect("insert user.get")
        .procedure(
            "slow.echo",
            Procedure::query(|_, input| {
                sleep(Duration::from_millis(50));
                Ok(input.unwrap_or(Value::Null))
            }),
        )
        .expect("insert slow.echo")
        .procedure(
            "thrower",
            Procedure::query(|_, _| Err(ProcedureError::internal("x"))),
        )
        .expect("insert thrower")
        .procedure(
            "user.create",
            Procedure::mutation(|_, input| Ok(input.unwrap_or(Value::Null))),
        )
        .expect("insert user.create")
        .build()
}

fn resolve(request: &RpcRequest) -> RecordingSink {
    resolve_with(request, &ResolveOptions::default())
}

fn resolve_with(request: &RpcRequest, options: &ResolveOptions<'_, ()>) -> RecordingSink {
    let router = app_router();
    let mut sink = RecordingSink::default();
    resolve_request(&router, &|_| Ok(()), request, options, &mut sink);
    sink
}

#[test]
fn buffered_single_success_reports_200_and_an_object_body() {
    let sink = resolve(&RpcRequest::get("user.get").with_query("input", r#"{"id":1}"#));
    assert_eq!(sink.head(), Some((200, false)));
    assert_eq!(
        sink.body().expect("body"),
        json!({"ok": true, "data": {"name": "a"}})
    );
}

#[test]
fn buffered_single_failure_reports_the_mapped_status() {
    let sink = resolve(&RpcRequest::get("thrower"));
    assert_eq!(sink.head(), Some((500, false)));
    let body = sink.body().expect("body");
    assert_eq!(body["ok"], json!(false));
    assert_eq!(body["error"]["kind"], "INTERNAL_SERVER_ERROR");
}

#[test]
fn buffered_batch_mixes_outcomes_positionally_under_a_multi_status() {
    let request = RpcRequest::get("user.get,thrower")
        .with_query("batch", "1")
        .with_query("input", r#"{"0":{"id":1}}"#);
    let sink = resolve(&request);
    assert_eq!(sink.head(), Some((207, false)));
    let body = sink.body().expect("body");
    assert_eq!(
        body,
        json!([
            {"ok": true, "data": {"name": "a"}},
            {"ok": false, "error": {"kind": "INTERNAL_SERVER_ERROR", "message": "x"}}
        ])
    );
}

#[test]
fn buffered_batch_of_successes_reports_200() {
    let request = RpcRequest::get("user.get,user.get").with_query("batch", "1");
    let sink = resolve(&request);
    assert_eq!(sink.head(), Some((200, false)));
    let body = sink.body().expect("body");
    assert_eq!(body.as_array().map(Vec::len), Some(2));
}

#[test]
fn streaming_sends_the_head_before_any_chunk_and_one_terminal() {
    let request = RpcRequest::get("user.get,slow.echo")
        .with_query("batch", "1")
        .with_header(BATCH_MODE_HEADER, BATCH_MODE_STREAM);
    let sink = resolve(&request);

    assert_eq!(
        sink.events.first(),
        Some(&SinkEvent::Head {
            status: 200,
            streaming: true
        })
    );
    assert!(
        sink.headers
            .iter()
            .any(|(name, value)| name == "Transfer-Encoding" && value == "chunked")
    );
    assert!(
        sink.headers
            .iter()
            .any(|(name, value)| name == "Vary" && value == BATCH_MODE_HEADER)
    );
    let terminals = sink
        .frames()
        .into_iter()
        .filter(|frame| *frame == "}" || *frame == "{}")
        .count();
    assert_eq!(terminals, 1);
    assert_eq!(sink.events.last(), Some(&SinkEvent::Close));
}

#[test]
fn streaming_chunks_land_in_completion_order_with_index_correlation() {
    let request = RpcRequest::get("slow.echo,user.get")
        .with_query("batch", "1")
        .with_query("input", r#"{"0":{"tag":"slow"}}"#)
        .with_header(BATCH_MODE_HEADER, BATCH_MODE_STREAM);
    let sink = resolve(&request);

    let frames = sink.frames();
    // user.get (index 1) completes first; slow.echo (index 0) follows.
    assert!(
        frames.first().is_some_and(|frame| frame.starts_with("{\"1\":")),
        "fast call should land first: {frames:?}"
    );
    let body = sink.stream_body();
    assert_eq!(body["0"]["data"], json!({"tag": "slow"}));
    assert_eq!(body["1"]["data"], json!({"name": "a"}));
}

#[test]
fn streaming_single_failing_call_yields_one_error_chunk_then_terminal() {
    let request = RpcRequest::get("thrower").with_header(BATCH_MODE_HEADER, BATCH_MODE_STREAM);
    let sink = resolve(&request);

    assert_eq!(sink.head(), Some((200, true)));
    let frames = sink.frames();
    assert_eq!(frames.len(), 2, "one data chunk plus terminal: {frames:?}");
    assert_eq!(frames.last(), Some(&"}"));
    let body = sink.stream_body();
    assert_eq!(body["0"]["error"]["kind"], "INTERNAL_SERVER_ERROR");
    assert_eq!(body["0"]["error"]["message"], "x");
}

#[test]
fn malformed_input_fails_request_level_before_any_call() {
    let request = RpcRequest::get("user.get,thrower")
        .with_query("batch", "1")
        .with_query("input", "{broken");
    let sink = resolve(&request);
    assert_eq!(sink.head(), Some((400, false)));
    let body = sink.body().expect("body");
    assert_eq!(body["error"]["kind"], "PARSE_ERROR");
    assert!(body.is_object(), "top-level error body is not an array");
}

#[test]
fn unsupported_methods_fail_request_level_with_405() {
    let sink = resolve(&RpcRequest::new("PUT", "user.get"));
    assert_eq!(sink.head(), Some((405, false)));
}

#[test]
fn batching_disabled_rejects_batches_request_level() {
    let options = ResolveOptions {
        batching_enabled: false,
        ..ResolveOptions::default()
    };
    let request = RpcRequest::get("user.get,thrower").with_query("batch", "1");
    let sink = resolve_with(&request, &options);
    assert_eq!(sink.head(), Some((400, false)));
}

#[test]
fn context_factory_failures_use_the_factory_error_kind() {
    let router = app_router();
    let mut sink = RecordingSink::default();
    let options = ResolveOptions::default();
    resolve_request(
        &router,
        &|_| Err(ProcedureError::new(spindle_core::ErrorKind::Unauthorized, "no token")),
        &RpcRequest::get("user.get"),
        &options,
        &mut sink,
    );
    assert_eq!(sink.head(), Some((401, false)));
    let body = sink.body().expect("body");
    assert_eq!(body["error"]["kind"], "UNAUTHORIZED");
}

/// Counts failed-call observations and optionally replaces the error.
struct Observer {
    seen: std::sync::Mutex<Vec<String>>,
    replace_with: Option<&'static str>,
}

impl ErrorInterceptor<()> for Observer {
    fn intercept(
        &self,
        event: &ErrorEvent<'_, ()>,
        _proceed: Proceed<'_, ()>,
    ) -> Result<(), ProcedureError> {
        self.seen
            .lock()
            .expect("observer lock")
            .push(event.path.to_owned());
        if let Some(message) = self.replace_with {
            return Err(ProcedureError::bad_request(message));
        }
        Ok(())
    }
}

#[test]
fn on_error_observes_each_failed_call_exactly_once() {
    let observer = Observer {
        seen: std::sync::Mutex::new(Vec::new()),
        replace_with: None,
    };
    let options = ResolveOptions {
        on_error: Some(&observer),
        ..ResolveOptions::default()
    };
    let request = RpcRequest::get("user.get,thrower,missing").with_query("batch", "1");
    let sink = resolve_with(&request, &options);
    assert_eq!(sink.head(), Some((207, false)));

    let mut seen = observer.seen.lock().expect("observer lock").clone();
    seen.sort();
    assert_eq!(seen, vec!["missing".to_owned(), "thrower".to_owned()]);
}

#[test]
fn on_error_replacement_surfaces_in_the_envelope() {
    let observer = Observer {
        seen: std::sync::Mutex::new(Vec::new()),
        replace_with: Some("redacted"),
    };
    let options = ResolveOptions {
        on_error: Some(&observer),
        ..ResolveOptions::default()
    };
    let sink = resolve_with(&RpcRequest::get("thrower"), &options);
    assert_eq!(sink.head(), Some((400, false)));
    let body = sink.body().expect("body");
    assert_eq!(body["error"]["kind"], "BAD_REQUEST");
    assert_eq!(body["error"]["message"], "redacted");
}

#[test]
fn response_meta_headers_reach_the_buffered_head() {
    let meta = |_: &[spindle_core::CallOutcome]| vec![("x-request-id".to_owned(), "7".to_owned())];
    let options = ResolveOptions {
        response_meta: Some(&meta),
        ..ResolveOptions::default()
    };
    let sink = resolve_with(&RpcRequest::get("user.get"), &options);
    assert!(
        sink.headers
            .iter()
            .any(|(name, value)| name == "x-request-id" && value == "7")
    );
}

#[test]
fn post_requests_resolve_mutations() {
    let request = RpcRequest::post("user.create").with_json_body(r#"{"name":"b"}"#);
    let sink = resolve(&request);
    assert_eq!(sink.head(), Some((200, false)));
    assert_eq!(
        sink.body().expect("body"),
        json!({"ok": true, "data": {"name": "b"}})
    );
}

#[test]
fn get_requests_cannot_reach_mutations() {
    let sink = resolve(&RpcRequest::get("user.create"));
    assert_eq!(sink.head(), Some((404, false)));
}

#[test]
fn shared_router_serves_concurrent_requests() {
    let router = Arc::new(app_router());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let router = Arc::clone(&router);
            std::thread::spawn(move || {
                let mut sink = RecordingSink::default();
                let options = ResolveOptions::default();
                resolve_request(
                    &router,
                    &|_| Ok(()),
                    &RpcRequest::get("user.get"),
                    &options,
                    &mut sink,
                );
                sink.head()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().expect("join"), Some((200, false)));
    }
}
