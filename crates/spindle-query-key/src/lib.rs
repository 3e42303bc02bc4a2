//! Stable correlation keys for client-side query caches.
//!
//! To allow easy interactions with groups of related queries — such as
//! invalidating everything under one router — a cache key is the path as a
//! segment array, optionally followed by the call's distinguishing
//! parameters. The key is consumed by an external caching collaborator; it
//! is never transmitted on the wire.
//!
//! Shapes:
//!
//! - `[]` — empty path, no input, wildcard type: matches all procedures.
//! - `[segments]` — no input and wildcard type.
//! - `[segments, {input?, type?}]` — everything else.
//!
//! Paginated (`infinite`) keys strip the `cursor` member from object
//! inputs before inclusion: cursor values must not fragment cache
//! correlation across pages.

use serde::Serialize;
use serde::ser::{SerializeSeq, Serializer};
use serde_json::Value;
use strum::{Display, EnumString};

/// How the consuming cache distinguishes query flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QueryKeyType {
    /// Wildcard: matches any flavour; never serialized into a key.
    Any,
    /// A paginated query whose pages share one key.
    Infinite,
    /// A plain query.
    Query,
}

/// Distinguishing parameters of a non-wildcard key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyParams {
    /// The call input, when one distinguishes the key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// The query flavour, when it distinguishes the key.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub query_type: Option<QueryKeyType>,
}

/// A stable, destructurable cache-correlation key.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryKey {
    segments: Vec<String>,
    params: Option<KeyParams>,
}

impl QueryKey {
    /// Returns the normalized path segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the distinguishing parameters, when present.
    #[must_use]
    pub const fn params(&self) -> Option<&KeyParams> {
        self.params.as_ref()
    }

    /// Renders the key as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for QueryKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.segments.is_empty() && self.params.is_none() {
            // An empty nested array would not match "all procedures" in the
            // consuming cache, so the empty key stays flat.
            let seq = serializer.serialize_seq(Some(0))?;
            return seq.end();
        }
        let length = 1 + usize::from(self.params.is_some());
        let mut seq = serializer.serialize_seq(Some(length))?;
        seq.serialize_element(&self.segments)?;
        if let Some(params) = &self.params {
            seq.serialize_element(params)?;
        }
        seq.end()
    }
}

/// Derives the cache key for a call.
///
/// Path parts may themselves contain the `.` separator; they are re-split
/// so dotted and pre-split spellings of the same path correlate.
#[must_use]
pub fn derive_query_key(path: &[&str], input: Option<Value>, query_type: QueryKeyType) -> QueryKey {
    let segments: Vec<String> = path
        .iter()
        .flat_map(|part| part.split('.'))
        .map(str::to_owned)
        .collect();
    let input = input.filter(|value| !value.is_null());

    if input.is_none() && query_type == QueryKeyType::Any {
        return QueryKey {
            segments,
            params: None,
        };
    }

    if query_type == QueryKeyType::Infinite
        && let Some(Value::Object(mut fields)) = input.clone()
        && fields.remove("cursor").is_some()
    {
        return QueryKey {
            segments,
            params: Some(KeyParams {
                input: Some(Value::Object(fields)),
                query_type: Some(QueryKeyType::Infinite),
            }),
        };
    }

    QueryKey {
        segments,
        params: Some(KeyParams {
            input,
            query_type: (query_type != QueryKeyType::Any).then_some(query_type),
        }),
    }
}
