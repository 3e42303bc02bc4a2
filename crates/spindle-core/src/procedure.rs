//! Procedure definitions.
//!
//! A [`Procedure`] couples a handler function with its [`ProcedureKind`].
//! Handlers receive the request-scoped context by reference and the opaque
//! JSON input; they are free to perform side effects, and they report
//! failure by returning a [`ProcedureError`]. Everything else (panic
//! containment, interception, enveloping) is the executor's job.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use strum::{Display, EnumString};

use crate::error::ProcedureError;

/// The invocation kind of a procedure.
///
/// Consumers handle the variants exhaustively; the kind decides default
/// status codes and whether a given transport can carry the call at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProcedureKind {
    /// A read-style call.
    Query,
    /// A write-style call.
    Mutation,
    /// The initiation of a subscription; needs a bidirectional transport.
    Subscription,
}

/// Handler signature shared by all procedures.
pub type HandlerFn<C> = dyn Fn(&C, Option<Value>) -> Result<Value, ProcedureError> + Send + Sync;

/// A named, independently invocable unit of server logic.
pub struct Procedure<C> {
    kind: ProcedureKind,
    handler: Box<HandlerFn<C>>,
}

impl<C> Procedure<C> {
    fn new(
        kind: ProcedureKind,
        handler: impl Fn(&C, Option<Value>) -> Result<Value, ProcedureError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            handler: Box::new(handler),
        }
    }

    /// Defines a query procedure.
    pub fn query(
        handler: impl Fn(&C, Option<Value>) -> Result<Value, ProcedureError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(ProcedureKind::Query, handler)
    }

    /// Defines a mutation procedure.
    pub fn mutation(
        handler: impl Fn(&C, Option<Value>) -> Result<Value, ProcedureError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(ProcedureKind::Mutation, handler)
    }

    /// Defines a subscription-initiation procedure.
    pub fn subscription(
        handler: impl Fn(&C, Option<Value>) -> Result<Value, ProcedureError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(ProcedureKind::Subscription, handler)
    }

    /// Returns the procedure's kind.
    #[must_use]
    pub const fn kind(&self) -> ProcedureKind {
        self.kind
    }

    /// Runs the handler with the given context and input.
    ///
    /// # Errors
    ///
    /// Propagates whatever error the handler returns.
    pub fn invoke(&self, ctx: &C, input: Option<Value>) -> Result<Value, ProcedureError> {
        (self.handler)(ctx, input)
    }
}

impl<C> fmt::Debug for Procedure<C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Procedure")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
