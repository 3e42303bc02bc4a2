//! Call execution and error interception.
//!
//! The executor's only job is outcome normalization: a normal handler
//! return becomes a success outcome, and any failure — a returned error or
//! a panic — is funnelled through the error-interception chain and becomes
//! an enveloped failure outcome. Each call runs inside its own containment
//! boundary so one call's failure can never escape into a sibling call.

use std::panic::{AssertUnwindSafe, catch_unwind};

use serde_json::Value;
use tracing::debug;

use crate::error::ProcedureError;
use crate::outcome::CallOutcome;
use crate::procedure::{Procedure, ProcedureKind};

const EXECUTOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::executor");

/// What an interceptor observes about one failed call.
pub struct ErrorEvent<'a, C> {
    /// The failure under consideration.
    pub error: &'a ProcedureError,
    /// The procedure path of the failed call; empty for request-level
    /// failures that precede any call.
    pub path: &'a str,
    /// The call's input payload, when one was supplied.
    pub input: Option<&'a Value>,
    /// The shared context; absent when the failure preceded its creation.
    pub ctx: Option<&'a C>,
    /// The call kind; absent when no call was resolved yet.
    pub kind: Option<ProcedureKind>,
}

/// A handler observing (and optionally replacing) an error before it is
/// finalized.
///
/// Interceptors form an ordered chain, outermost first. Each one receives
/// the event plus an explicit [`Proceed`] continuation: invoking the
/// continuation passes control to the next handler in the chain, and not
/// invoking it stops the chain there. Returning `Err` replaces the error
/// that will be enveloped; the replacement is final and is not handed to
/// the remaining handlers.
pub trait ErrorInterceptor<C>: Send + Sync {
    /// Observes one failure event.
    ///
    /// # Errors
    ///
    /// An `Err` return replaces the original error.
    fn intercept(
        &self,
        event: &ErrorEvent<'_, C>,
        proceed: Proceed<'_, C>,
    ) -> Result<(), ProcedureError>;
}

impl<C, F> ErrorInterceptor<C> for F
where
    F: Fn(&ErrorEvent<'_, C>, Proceed<'_, C>) -> Result<(), ProcedureError> + Send + Sync,
{
    fn intercept(
        &self,
        event: &ErrorEvent<'_, C>,
        proceed: Proceed<'_, C>,
    ) -> Result<(), ProcedureError> {
        self(event, proceed)
    }
}

/// Explicit continuation handed to each interceptor.
pub struct Proceed<'a, C> {
    rest: &'a [&'a dyn ErrorInterceptor<C>],
    event: &'a ErrorEvent<'a, C>,
}

impl<C> Proceed<'_, C> {
    /// Passes control to the next handler in the chain.
    ///
    /// # Errors
    ///
    /// Propagates a replacement error produced further down the chain.
    pub fn invoke(self) -> Result<(), ProcedureError> {
        run_chain(self.rest, self.event)
    }
}

/// Runs an interception chain over one failure event.
///
/// # Errors
///
/// Returns the replacement error when any handler in the chain produced
/// one.
pub fn run_chain<C>(
    chain: &[&dyn ErrorInterceptor<C>],
    event: &ErrorEvent<'_, C>,
) -> Result<(), ProcedureError> {
    let Some((head, rest)) = chain.split_first() else {
        return Ok(());
    };
    head.intercept(event, Proceed { rest, event })
}

/// Finalizes a failure through the interception chain.
///
/// Returns the original error when no handler replaced it, or the
/// replacement otherwise. The replacement is not re-intercepted.
#[must_use]
pub fn intercept_failure<C>(
    error: ProcedureError,
    ctx: Option<&C>,
    path: &str,
    input: Option<&Value>,
    kind: Option<ProcedureKind>,
    chain: &[&dyn ErrorInterceptor<C>],
) -> ProcedureError {
    let event = ErrorEvent {
        error: &error,
        path,
        input,
        ctx,
        kind,
    };
    match run_chain(chain, &event) {
        Ok(()) => error,
        Err(replacement) => replacement,
    }
}

/// Executes one resolved procedure and normalizes the result.
///
/// The handler runs inside a panic-containment boundary; a panic is coerced
/// to an internal error rather than unwinding into sibling calls. Failures
/// pass through the interception chain before being enveloped.
pub fn execute_call<C>(
    procedure: &Procedure<C>,
    ctx: &C,
    path: &str,
    input: Option<&Value>,
    chain: &[&dyn ErrorInterceptor<C>],
) -> CallOutcome {
    let result = catch_unwind(AssertUnwindSafe(|| procedure.invoke(ctx, input.cloned())));
    let error = match result {
        Ok(Ok(data)) => return CallOutcome::success(data),
        Ok(Err(error)) => error,
        Err(payload) => ProcedureError::from_panic(payload.as_ref()),
    };
    debug!(target: EXECUTOR_TARGET, path, %error, "call failed");
    let final_error = intercept_failure(error, Some(ctx), path, input, Some(procedure.kind()), chain);
    CallOutcome::failure(final_error.into_envelope())
}
