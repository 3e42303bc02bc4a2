//! The resolution pipeline: one request in, response bytes out.
//!
//! Order of operations: derive the call descriptors, create the context
//! (once per request, not per call), then execute. Failures up to that
//! point are request-level and produce a single top-level error response;
//! from there on every failure is contained to its call's outcome.

use tracing::{debug, warn};

use spindle_core::{CallOutcome, ErrorInterceptor, ProcedureError, Router, intercept_failure};

use crate::descriptor::parse_calls;
use crate::framer::{ResponseSink, buffered_head, overall_status, streaming_head};
use crate::request::RpcRequest;
use crate::stream::StreamFormatter;

const RESOLVE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::resolve");

/// Emitted in place of an outcome that failed to encode; the outcome
/// model keeps this unreachable in practice.
const ENCODE_FALLBACK: &str =
    r#"{"ok":false,"error":{"kind":"INTERNAL_SERVER_ERROR","message":"failed to encode outcome"}}"#;

/// Builds the request-scoped context, invoked once per request.
pub type ContextFactory<'a, C> =
    &'a (dyn Fn(&RpcRequest) -> Result<C, ProcedureError> + Send + Sync);

/// Contributes extra response headers, given the buffered outcomes (or no
/// outcomes, when the head is sent eagerly for a stream).
pub type ResponseMetaFn<'a> = &'a (dyn Fn(&[CallOutcome]) -> Vec<(String, String)> + Send + Sync);

/// Per-endpoint resolution options.
pub struct ResolveOptions<'a, C> {
    /// Whether `?batch=1` requests are honored.
    pub batching_enabled: bool,
    /// Observer for failed calls; an `Err` it returns replaces the error
    /// that is enveloped, but it cannot turn a failure into a success.
    pub on_error: Option<&'a dyn ErrorInterceptor<C>>,
    /// Optional extra-header hook.
    pub response_meta: Option<ResponseMetaFn<'a>>,
}

impl<C> Default for ResolveOptions<'_, C> {
    fn default() -> Self {
        Self {
            batching_enabled: true,
            on_error: None,
            response_meta: None,
        }
    }
}

/// Resolves one request against a router and writes the response through
/// the sink.
///
/// Transport write failures are swallowed (the peer may already be gone);
/// they are logged and never propagate to the caller.
pub fn resolve_request<C: Sync>(
    router: &Router<C>,
    context: ContextFactory<'_, C>,
    request: &RpcRequest,
    options: &ResolveOptions<'_, C>,
    sink: &mut dyn ResponseSink,
) {
    let chain: Vec<&dyn ErrorInterceptor<C>> = options.on_error.into_iter().collect();

    let parsed = match parse_calls(request, options.batching_enabled) {
        Ok(parsed) => parsed,
        Err(error) => {
            respond_request_error(options, &chain, None::<&C>, error, sink);
            return;
        }
    };
    let ctx = match context(request) {
        Ok(ctx) => ctx,
        Err(error) => {
            respond_request_error(options, &chain, None::<&C>, error, sink);
            return;
        }
    };

    debug!(
        target: RESOLVE_TARGET,
        path = %request.path,
        calls = parsed.calls.len(),
        batched = parsed.batched,
        streaming = request.stream_requested(),
        "resolving request"
    );

    if request.stream_requested() {
        let head = streaming_head(meta_headers(options, &[]));
        let mut formatter = StreamFormatter::new(sink);
        formatter.send_head(&head);
        crate::batch::execute_batch(router, &ctx, &parsed.calls, &chain, |index, outcome| {
            formatter.emit(index.max(0), &encode_outcome(outcome));
        });
        formatter.finish();
        return;
    }

    let outcomes = crate::batch::execute_batch(router, &ctx, &parsed.calls, &chain, |_, _| {});
    let status = overall_status(&outcomes, parsed.batched);
    let body = if parsed.batched {
        serde_json::to_string(&outcomes).unwrap_or_else(|_| ENCODE_FALLBACK.to_owned())
    } else {
        outcomes
            .first()
            .map(encode_outcome)
            .unwrap_or_else(|| ENCODE_FALLBACK.to_owned())
    };
    let head = buffered_head(status, meta_headers(options, &outcomes));
    send_buffered(sink, &head, &body);
}

/// Writes the single top-level response for a failure that preceded any
/// call execution.
fn respond_request_error<C>(
    options: &ResolveOptions<'_, C>,
    chain: &[&dyn ErrorInterceptor<C>],
    ctx: Option<&C>,
    error: ProcedureError,
    sink: &mut dyn ResponseSink,
) {
    let final_error = intercept_failure(error, ctx, "", None, None, chain);
    let outcome = CallOutcome::failure(final_error.into_envelope());
    let status = outcome.error_status().unwrap_or(500);
    let head = buffered_head(status, meta_headers(options, &[]));
    send_buffered(sink, &head, &encode_outcome(&outcome));
}

fn send_buffered(sink: &mut dyn ResponseSink, head: &crate::framer::ResponseHead, body: &str) {
    if let Err(error) = sink.send_head(head) {
        warn!(target: RESOLVE_TARGET, %error, "failed to send response head");
        return;
    }
    if let Err(error) = sink.send_body(body) {
        warn!(target: RESOLVE_TARGET, %error, "failed to send response body");
        return;
    }
    if let Err(error) = sink.close() {
        warn!(target: RESOLVE_TARGET, %error, "failed to close response");
    }
}

fn meta_headers<C>(
    options: &ResolveOptions<'_, C>,
    outcomes: &[CallOutcome],
) -> Vec<(String, String)> {
    options
        .response_meta
        .map(|meta| meta(outcomes))
        .unwrap_or_default()
}

fn encode_outcome(outcome: &CallOutcome) -> String {
    serde_json::to_string(outcome).unwrap_or_else(|error| {
        warn!(target: RESOLVE_TARGET, %error, "failed to encode outcome");
        ENCODE_FALLBACK.to_owned()
    })
}
