//! The daemon's built-in router and the connection handler serving it.
//!
//! The built-in procedures keep the daemon useful out of the box (health
//! probes, echo diagnostics); an embedding application swaps in its own
//! router through [`RpcConnectionHandler::new`].

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Value, json};
use tracing::{debug, warn};

use spindle_core::{ErrorKind, Procedure, ProcedureError, Router, RouterBuildError};
use spindle_http::{ResolveOptions, RpcRequest, resolve_request};

use crate::config::Config;
use crate::http::{HttpResponseSink, read_request, write_error_response};
use crate::transport::{ConnectionHandler, ConnectionStream};

const SERVICE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::service");

/// Request-scoped context handed to every procedure.
#[derive(Debug, Clone, Copy)]
pub struct DaemonContext {
    /// When the daemon process started.
    pub started: Instant,
}

/// Builds the daemon's built-in router.
///
/// # Errors
///
/// Returns a [`RouterBuildError`] when the built-in paths collide, which
/// would be a programming error caught at startup.
pub fn demo_router() -> Result<Router<DaemonContext>, RouterBuildError> {
    Ok(Router::builder()
        .procedure(
            "health.check",
            Procedure::query(|ctx: &DaemonContext, _| {
                let uptime_ms = u64::try_from(ctx.started.elapsed().as_millis()).unwrap_or(u64::MAX);
                Ok(json!({"status": "ok", "uptime_ms": uptime_ms}))
            }),
        )?
        .procedure(
            "echo.say",
            Procedure::query(|_: &DaemonContext, input| Ok(input.unwrap_or(Value::Null))),
        )?
        .procedure(
            "echo.reverse",
            Procedure::query(|_: &DaemonContext, input| {
                let text = input
                    .as_ref()
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ProcedureError::new(
                            ErrorKind::UnprocessableContent,
                            "echo.reverse expects a string input",
                        )
                    })?;
                Ok(Value::String(text.chars().rev().collect()))
            }),
        )?
        .procedure(
            "echo.shout",
            Procedure::mutation(|_: &DaemonContext, input| {
                let text = input
                    .as_ref()
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ProcedureError::new(
                            ErrorKind::UnprocessableContent,
                            "echo.shout expects a string input",
                        )
                    })?;
                Ok(Value::String(text.to_uppercase()))
            }),
        )?
        .build())
}

/// Connection handler resolving procedure calls over the HTTP surface.
pub struct RpcConnectionHandler {
    router: Arc<Router<DaemonContext>>,
    endpoint: String,
    batching_enabled: bool,
    started: Instant,
}

impl RpcConnectionHandler {
    /// Creates a handler serving `router` with the daemon configuration.
    #[must_use]
    pub fn new(router: Arc<Router<DaemonContext>>, config: &Config) -> Self {
        Self {
            router,
            endpoint: config.endpoint().to_owned(),
            batching_enabled: config.batching_enabled(),
            started: Instant::now(),
        }
    }
}

impl ConnectionHandler for RpcConnectionHandler {
    fn handle(&self, mut stream: ConnectionStream) {
        let request = match read_request(&mut stream, &self.endpoint) {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!(target: SERVICE_TARGET, "client disconnected without a request");
                return;
            }
            Err(error) => {
                warn!(target: SERVICE_TARGET, %error, "failed to read request");
                write_error_response(&mut stream, &error);
                return;
            }
        };

        debug!(
            target: SERVICE_TARGET,
            method = %request.method,
            path = %request.path,
            "dispatching request"
        );

        let started = self.started;
        let context = move |_: &RpcRequest| Ok(DaemonContext { started });
        let options = ResolveOptions {
            batching_enabled: self.batching_enabled,
            ..ResolveOptions::default()
        };
        let mut sink = HttpResponseSink::new(&mut stream);
        resolve_request(&self.router, &context, &request, &options, &mut sink);
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    use rstest::{fixture, rstest};

    use super::*;

    /// One-shot TCP server/client pair around the connection handler.
    struct HandlerTestHarness {
        client: TcpStream,
        server: JoinHandle<()>,
    }

    impl HandlerTestHarness {
        /// Sends raw request bytes and collects the whole response.
        fn send_and_collect(&mut self, request: &[u8]) -> String {
            self.client.write_all(request).expect("write request");
            self.client.flush().expect("flush request");
            let mut response = String::new();
            self.client
                .read_to_string(&mut response)
                .expect("read response");
            response
        }

        fn join(self) {
            self.server.join().expect("server join");
        }
    }

    #[fixture]
    fn harness() -> HandlerTestHarness {
        harness_with(Config::default())
    }

    fn harness_with(config: Config) -> HandlerTestHarness {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let addr: SocketAddr = listener.local_addr().expect("addr");
        let server = thread::spawn(move || {
            let router = Arc::new(demo_router().expect("build router"));
            let handler = RpcConnectionHandler::new(router, &config);
            let (stream, _) = listener.accept().expect("accept");
            handler.handle(ConnectionStream::Tcp(stream));
        });
        let client = TcpStream::connect(addr).expect("connect");
        HandlerTestHarness { client, server }
    }

    #[rstest]
    fn serves_health_checks(mut harness: HandlerTestHarness) {
        let response =
            harness.send_and_collect(b"GET /rpc/health.check HTTP/1.1\r\nHost: x\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.contains(r#""ok":true"#));
        assert!(response.contains(r#""status":"ok""#));
        harness.join();
    }

    #[rstest]
    fn serves_buffered_batches_with_positional_outcomes(mut harness: HandlerTestHarness) {
        let response = harness.send_and_collect(
            b"GET /rpc/echo.say,missing?batch=1&input=%7B%220%22%3A%22hi%22%7D HTTP/1.1\r\nHost: x\r\n\r\n",
        );
        assert!(response.starts_with("HTTP/1.1 207 Multi-Status"), "{response}");
        assert!(response.contains(r#"{"ok":true,"data":"hi"}"#));
        assert!(response.contains(r#""kind":"NOT_FOUND""#));
        harness.join();
    }

    #[rstest]
    fn streams_chunked_responses_with_a_terminal_frame(mut harness: HandlerTestHarness) {
        let response = harness.send_and_collect(
            b"GET /rpc/health.check,echo.say?batch=1 HTTP/1.1\r\nHost: x\r\nSpindle-Batch-Mode: stream\r\n\r\n",
        );
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.contains("Transfer-Encoding: chunked"));
        assert!(response.contains("Vary: spindle-batch-mode"));
        // The chunked payload carries both indexed frames, the closing
        // brace, and the zero-length terminating chunk.
        assert!(response.contains("\"0\":{\"ok\":true"));
        assert!(response.contains("\"1\":{\"ok\":true"));
        assert!(response.contains("\r\n}"));
        assert!(response.ends_with("0\r\n\r\n"), "{response}");
        harness.join();
    }

    #[rstest]
    fn serves_mutations_over_post(mut harness: HandlerTestHarness) {
        let response = harness.send_and_collect(
            b"POST /rpc/echo.shout HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: 4\r\n\r\n\"hi\"",
        );
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.contains(r#""data":"HI""#));
        harness.join();
    }

    #[rstest]
    fn reports_not_found_for_unknown_procedures(mut harness: HandlerTestHarness) {
        let response =
            harness.send_and_collect(b"GET /rpc/nope HTTP/1.1\r\nHost: x\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 404 Not Found"), "{response}");
        assert!(response.contains(r#""kind":"NOT_FOUND""#));
        harness.join();
    }

    #[rstest]
    fn rejects_malformed_requests(mut harness: HandlerTestHarness) {
        let response = harness.send_and_collect(b"garbage\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 400 Bad Request"), "{response}");
        harness.join();
    }

    #[test]
    fn honours_the_no_batching_configuration() {
        let mut harness = harness_with(Config::default().with_batching(false));
        let response = harness
            .send_and_collect(b"GET /rpc/echo.say,health.check?batch=1 HTTP/1.1\r\nHost: x\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 400 Bad Request"), "{response}");
        assert!(response.contains(r#""kind":"BAD_REQUEST""#));
        harness.join();
    }
}
