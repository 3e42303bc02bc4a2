//! Failure taxonomy and the serializable error envelope.
//!
//! Every failure that crosses the resolution boundary is classified into the
//! closed [`ErrorKind`] taxonomy and carried as a [`ProcedureError`]. The
//! wire projection of a failure is the [`ErrorEnvelope`]; it renders the
//! underlying cause to a string so the envelope always serializes, even when
//! the cause itself would not.

use std::any::Any;
use std::error::Error as StdError;

use serde::Serialize;
use serde_json::Value;
use strum::{Display, EnumString};
use thiserror::Error;

use crate::procedure::ProcedureKind;

/// Closed classification of procedure failures.
///
/// Each kind maps to exactly one transport status code via
/// [`ErrorKind::http_status`]; the mapping is a fixed table. Failures
/// without a recognized kind are coerced to
/// [`ErrorKind::InternalServerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// A payload could not be parsed as JSON.
    ParseError,
    /// The request was structurally invalid.
    BadRequest,
    /// The caller is not authenticated.
    Unauthorized,
    /// The caller is authenticated but not allowed.
    Forbidden,
    /// No procedure matched the requested path and kind.
    NotFound,
    /// The transport method cannot carry this call.
    MethodNotSupported,
    /// The handler gave up waiting on a collaborator.
    Timeout,
    /// The request conflicts with current state.
    Conflict,
    /// A precondition declared by the caller failed.
    PreconditionFailed,
    /// The payload exceeds a configured limit.
    PayloadTooLarge,
    /// The payload parsed but failed validation.
    UnprocessableContent,
    /// The caller is being rate limited.
    TooManyRequests,
    /// The client went away before the response was written.
    ClientClosedRequest,
    /// Any otherwise-unclassified failure.
    InternalServerError,
}

impl ErrorKind {
    /// Returns the transport status code for this kind.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::ParseError | Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::MethodNotSupported => 405,
            Self::Timeout => 408,
            Self::Conflict => 409,
            Self::PreconditionFailed => 412,
            Self::PayloadTooLarge => 413,
            Self::UnprocessableContent => 422,
            Self::TooManyRequests => 429,
            Self::ClientClosedRequest => 499,
            Self::InternalServerError => 500,
        }
    }
}

/// A classified failure raised by a handler or by the resolution pipeline.
///
/// Handlers return this type directly to select a kind; anything else a
/// handler does wrong (including panicking) is coerced to
/// [`ErrorKind::InternalServerError`] by the executor.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct ProcedureError {
    kind: ErrorKind,
    message: String,
    data: Option<Value>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl ProcedureError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            source: None,
        }
    }

    /// Creates a `BadRequest` error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    /// Creates a `NotFound` error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Creates a `MethodNotSupported` error.
    pub fn method_not_supported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MethodNotSupported, message)
    }

    /// Creates an `InternalServerError` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalServerError, message)
    }

    /// Creates the standard error for a path that resolves to nothing of
    /// the requested kind.
    pub fn no_procedure(kind: ProcedureKind, path: &str) -> Self {
        Self::not_found(format!("no \"{kind}\"-procedure on path \"{path}\""))
    }

    /// Coerces a panic payload into an `InternalServerError`.
    ///
    /// The payload's message is preserved when the handler panicked with a
    /// string; anything else is diagnostic-only and replaced.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|text| (*text).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_owned());
        Self::internal(message)
    }

    /// Attaches structured data (for example validation issues).
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attaches an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the attached structured data, when present.
    #[must_use]
    pub const fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Projects this error into its serializable wire form.
    ///
    /// A non-serializable cause is rendered to its display string rather
    /// than forwarded, so the envelope itself can always be serialized.
    #[must_use]
    pub fn into_envelope(self) -> ErrorEnvelope {
        ErrorEnvelope {
            kind: self.kind,
            message: self.message,
            cause: self.source.as_ref().map(ToString::to_string),
            data: self.data,
        }
    }
}

impl From<serde_json::Error> for ProcedureError {
    fn from(source: serde_json::Error) -> Self {
        Self::new(ErrorKind::ParseError, source.to_string()).with_source(source)
    }
}

/// Serializable projection of a [`ProcedureError`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEnvelope {
    /// Taxonomy tag for the failure.
    pub kind: ErrorKind,
    /// Human-readable message; stable only for tagged errors.
    pub message: String,
    /// Rendered underlying cause, when one was attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    /// Structured failure data, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorEnvelope {
    /// Returns the transport status code for the enveloped kind.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.kind.http_status()
    }
}
