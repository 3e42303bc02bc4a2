//! Transport-agnostic request resolution for the Spindle protocol.
//!
//! This crate turns one received request into response bytes. The moving
//! parts, leaves first:
//!
//! - [`RpcRequest`] — the transport-agnostic inbound shape (method, path,
//!   query, headers, raw body).
//! - [`parse_calls`] — derives the batch of [`CallDescriptor`]s a request
//!   carries, enforcing the method/kind mapping and the batching markers.
//! - [`execute_batch`] — runs the descriptors concurrently and
//!   independently, forwarding each outcome the instant it lands while
//!   preserving index correlation.
//! - [`ResponseHead`] / [`ResponseSink`] — the framing decision and the
//!   injectable sink it is written through.
//! - [`StreamFormatter`] — the chunk state machine for streamed responses.
//! - [`resolve_request`] — the pipeline tying the above together.
//!
//! Procedure definitions, the router tree, and the error taxonomy live in
//! `spindle-core`; socket hosting lives in `spindled`.

mod batch;
mod descriptor;
mod framer;
mod request;
mod resolve;
mod stream;

pub use batch::execute_batch;
pub use descriptor::{CallDescriptor, ParsedCalls, UNBATCHED_INDEX, parse_calls};
pub use framer::{ResponseHead, ResponseSink};
pub use request::{BATCH_MODE_HEADER, BATCH_MODE_STREAM, RpcRequest};
pub use resolve::{ContextFactory, ResolveOptions, ResponseMetaFn, resolve_request};
pub use stream::StreamFormatter;
