//! Normalized per-call results.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::error::ErrorEnvelope;

/// The normalized result of executing one call.
///
/// Created by the executor, owned by the framing layer until serialized,
/// and immutable once created. Serializes as `{"ok":true,"data":…}` or
/// `{"ok":false,"error":{…}}`.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// The handler returned normally.
    Success {
        /// The handler's result payload.
        data: Value,
    },
    /// The handler (or the resolution of the call) failed.
    Failure {
        /// The enveloped, serializable failure.
        error: ErrorEnvelope,
    },
}

impl CallOutcome {
    /// Wraps a handler result payload.
    #[must_use]
    pub const fn success(data: Value) -> Self {
        Self::Success { data }
    }

    /// Wraps an enveloped failure.
    #[must_use]
    pub const fn failure(error: ErrorEnvelope) -> Self {
        Self::Failure { error }
    }

    /// Returns true for successful outcomes.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns the mapped status code when this outcome is a failure.
    #[must_use]
    pub const fn error_status(&self) -> Option<u16> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error } => Some(error.http_status()),
        }
    }
}

impl Serialize for CallOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        match self {
            Self::Success { data } => {
                map.serialize_entry("ok", &true)?;
                map.serialize_entry("data", data)?;
            }
            Self::Failure { error } => {
                map.serialize_entry("ok", &false)?;
                map.serialize_entry("error", error)?;
            }
        }
        map.end()
    }
}
