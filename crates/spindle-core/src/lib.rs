//! Core resolution engine for the Spindle procedure-call protocol.
//!
//! A Spindle server exposes a tree of named procedures. This crate owns the
//! pieces of that model that are independent of any transport:
//!
//! - [`Router`] — the immutable procedure tree, built once at startup by
//!   [`RouterBuilder`] and shared read-only by every request. Duplicate
//!   paths are a build-time error, never a request-time one.
//! - [`Procedure`] and [`ProcedureKind`] — a handler tagged as a query,
//!   mutation, or subscription initiation.
//! - [`ErrorKind`], [`ProcedureError`] and [`ErrorEnvelope`] — the closed
//!   failure taxonomy, the in-process error carrier, and its serializable
//!   wire projection.
//! - [`execute_call`] and the [`ErrorInterceptor`] chain — per-call outcome
//!   normalization with isolated failure containment.
//! - [`CallerFactory`] — direct (transport-less) invocation of procedures
//!   with factory- and caller-level error interception.
//!
//! Request parsing, batching, and response framing live in `spindle-http`;
//! hosting lives in `spindled`.

mod caller;
mod error;
mod executor;
mod outcome;
mod procedure;
mod router;

pub use caller::{Caller, CallerFactory};
pub use error::{ErrorEnvelope, ErrorKind, ProcedureError};
pub use executor::{
    ErrorEvent, ErrorInterceptor, Proceed, execute_call, intercept_failure, run_chain,
};
pub use outcome::CallOutcome;
pub use procedure::{Procedure, ProcedureKind};
pub use router::{Router, RouterBuilder, RouterBuildError, RouterNode};
