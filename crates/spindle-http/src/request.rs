//! The transport-agnostic inbound request shape.
//!
//! Adapters construct an [`RpcRequest`] from whatever their server runtime
//! hands them; the resolution pipeline never touches a transport type
//! directly. The body is only consulted when the declared content type
//! indicates a JSON payload.

/// Request header a client sets to ask for a streamed response.
pub const BATCH_MODE_HEADER: &str = "spindle-batch-mode";

/// Value of [`BATCH_MODE_HEADER`] that enables streaming.
pub const BATCH_MODE_STREAM: &str = "stream";

/// One inbound request, already stripped of any endpoint mount prefix.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    /// HTTP-equivalent method.
    pub method: String,
    /// Procedure path (comma-separated list when batched), with
    /// surrounding slashes already trimmed.
    pub path: String,
    /// Decoded query parameters, in arrival order.
    pub query: Vec<(String, String)>,
    /// Headers, in arrival order; name lookup is case-insensitive.
    pub headers: Vec<(String, String)>,
    /// Raw request body.
    pub body: Vec<u8>,
}

impl RpcRequest {
    /// Creates a request with the given method and path.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Creates a GET request (resolves to queries).
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    /// Creates a POST request (resolves to mutations).
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new("POST", path)
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the raw body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body along with its content type.
    #[must_use]
    pub fn with_json_body(self, body: impl Into<Vec<u8>>) -> Self {
        self.with_header("content-type", "application/json")
            .with_body(body)
    }

    /// Returns the first header with the given name, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the first query parameter with the given name.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether the declared content type is a JSON media type.
    #[must_use]
    pub fn is_json_body(&self) -> bool {
        self.header("content-type")
            .is_some_and(|value| value.trim_start().starts_with("application/json"))
    }

    /// Whether the client marked this request as a batch.
    #[must_use]
    pub fn batch_requested(&self) -> bool {
        self.query_param("batch") == Some("1")
    }

    /// Whether the client declared streaming capability.
    #[must_use]
    pub fn stream_requested(&self) -> bool {
        self.header(BATCH_MODE_HEADER)
            .is_some_and(|value| value.eq_ignore_ascii_case(BATCH_MODE_STREAM))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let request = RpcRequest::get("ping").with_header("Content-Type", "application/json");
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert!(request.is_json_body());
    }

    #[test]
    fn json_body_detection_allows_charset_suffix() {
        let request =
            RpcRequest::post("ping").with_header("content-type", "application/json; charset=utf-8");
        assert!(request.is_json_body());
        let request = RpcRequest::post("ping").with_header("content-type", "text/plain");
        assert!(!request.is_json_body());
    }

    #[test]
    fn batch_marker_requires_the_exact_value() {
        assert!(RpcRequest::get("a,b").with_query("batch", "1").batch_requested());
        assert!(!RpcRequest::get("a,b").with_query("batch", "2").batch_requested());
        assert!(!RpcRequest::get("a").batch_requested());
    }

    #[test]
    fn stream_marker_matches_case_insensitively() {
        let request = RpcRequest::get("a").with_header("Spindle-Batch-Mode", "Stream");
        assert!(request.stream_requested());
        assert!(!RpcRequest::get("a").stream_requested());
    }
}
