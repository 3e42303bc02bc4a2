//! Deriving call descriptors from an inbound request.
//!
//! One request carries either a single call or a comma-separated batch of
//! calls. Parsing happens once, before any call executes; failures here are
//! request-level and produce a single top-level error response rather than
//! per-call envelopes.

use serde_json::Value;

use spindle_core::{ProcedureError, ProcedureKind};

use crate::request::RpcRequest;

/// Sentinel index marking a descriptor that was not part of a batch.
pub const UNBATCHED_INDEX: i32 = -1;

/// One unit of work derived from a request.
///
/// Created when the request is parsed, consumed once by the executor, and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CallDescriptor {
    /// Position in the batch, or [`UNBATCHED_INDEX`] for a single call.
    pub index: i32,
    /// Procedure path.
    pub path: String,
    /// Opaque input payload; handlers deserialize it themselves.
    pub input: Option<Value>,
    /// The call kind implied by the transport method.
    pub kind: ProcedureKind,
}

impl CallDescriptor {
    /// Returns the non-negative result-slot position for this descriptor.
    #[must_use]
    pub const fn slot(&self) -> usize {
        if self.index < 0 {
            0
        } else {
            self.index as usize
        }
    }
}

/// The calls a request resolved to, plus the batch flag that decides the
/// response body shape.
#[derive(Debug)]
pub struct ParsedCalls {
    /// Whether the client marked the request as a batch.
    pub batched: bool,
    /// The derived descriptors, in request order.
    pub calls: Vec<CallDescriptor>,
}

/// Derives the call descriptors carried by `request`.
///
/// # Errors
///
/// Returns a request-level error when the method is unsupported, when
/// batching is requested but disabled, when a batch names no procedures,
/// or when the input payload is not valid JSON.
pub fn parse_calls(
    request: &RpcRequest,
    batching_enabled: bool,
) -> Result<ParsedCalls, ProcedureError> {
    let kind = kind_for_method(&request.method)?;
    let batched = request.batch_requested();
    if batched && !batching_enabled {
        return Err(ProcedureError::bad_request(
            "batching is not enabled on this endpoint",
        ));
    }
    if batched && request.path.trim().is_empty() {
        return Err(ProcedureError::bad_request("batch names no procedures"));
    }

    let paths: Vec<&str> = if batched {
        request.path.split(',').collect()
    } else {
        vec![request.path.as_str()]
    };
    let inputs = raw_inputs(request)?;

    let calls = paths
        .into_iter()
        .enumerate()
        .map(|(position, path)| CallDescriptor {
            index: if batched {
                i32::try_from(position).unwrap_or(i32::MAX)
            } else {
                UNBATCHED_INDEX
            },
            path: path.to_owned(),
            input: input_for(inputs.as_ref(), batched, position),
            kind,
        })
        .collect();

    Ok(ParsedCalls { batched, calls })
}

fn kind_for_method(method: &str) -> Result<ProcedureKind, ProcedureError> {
    if method.eq_ignore_ascii_case("GET") {
        Ok(ProcedureKind::Query)
    } else if method.eq_ignore_ascii_case("POST") {
        Ok(ProcedureKind::Mutation)
    } else {
        Err(ProcedureError::method_not_supported(format!(
            "unsupported method: {method}"
        )))
    }
}

/// Reads the undivided input payload: the `input` query parameter for GET,
/// the JSON body for POST. A non-JSON content type means no input.
fn raw_inputs(request: &RpcRequest) -> Result<Option<Value>, ProcedureError> {
    if request.method.eq_ignore_ascii_case("GET") {
        return request
            .query_param("input")
            .map(serde_json::from_str)
            .transpose()
            .map_err(ProcedureError::from);
    }
    if request.body.is_empty() || !request.is_json_body() {
        return Ok(None);
    }
    serde_json::from_slice(&request.body)
        .map(Some)
        .map_err(ProcedureError::from)
}

/// Picks one call's input out of the undivided payload. Batched payloads
/// are one JSON object keyed by the stringified call index.
fn input_for(inputs: Option<&Value>, batched: bool, position: usize) -> Option<Value> {
    let payload = inputs?;
    if batched {
        payload.get(position.to_string().as_str()).cloned()
    } else {
        Some(payload.clone())
    }
}
