//! Captured network traffic.
//!
//! Immutable records of requests and responses observed on a page, plus the
//! body decoding shared by the matcher and the response interpreter.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// HTTP methods for request matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    /// GET request
    Get,
    /// POST request
    Post,
    /// PUT request
    Put,
    /// DELETE request
    Delete,
    /// PATCH request
    Patch,
    /// HEAD request
    Head,
    /// OPTIONS request
    Options,
    /// Any method
    Any,
}

impl HttpMethod {
    /// Parse from string
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "PATCH" => Self::Patch,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            _ => Self::Any,
        }
    }

    /// Convert to string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Any => "*",
        }
    }

    /// Check if this method matches another
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        *self == Self::Any || *other == Self::Any || *self == *other
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a captured event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Outgoing request
    Request,
    /// Incoming response
    Response,
}

/// Parsed JSON-RPC envelope.
///
/// Request side carries `method`/`params`, response side carries
/// `result`/`error`; both carry `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcEnvelope {
    /// Request/response correlation id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// RPC method name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// RPC parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// RPC result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// RPC error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl RpcEnvelope {
    /// Parse a body as a JSON-RPC envelope.
    ///
    /// Returns `None` unless the body is a JSON object that either has a
    /// string `method` with object `params` (request) or an `id` (response).
    #[must_use]
    pub fn parse(body: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(body).ok()?;
        let obj = value.as_object()?;

        let method = obj.get("method").and_then(Value::as_str).map(str::to_string);
        let params = obj.get("params").filter(|p| p.is_object()).cloned();
        let id = obj.get("id").filter(|id| !id.is_null()).cloned();

        let is_request = method.is_some() && params.is_some();
        if !is_request && id.is_none() {
            return None;
        }

        Some(Self {
            id,
            method,
            params,
            result: obj.get("result").cloned(),
            error: obj.get("error").filter(|e| !e.is_null()).cloned(),
        })
    }

    /// Whether this envelope is a request (method + object params)
    #[must_use]
    pub const fn is_request(&self) -> bool {
        self.method.is_some() && self.params.is_some()
    }

    /// The `params.path` string, if present
    #[must_use]
    pub fn param_path(&self) -> Option<&str> {
        self.params.as_ref()?.get("path")?.as_str()
    }

    /// Compare ids, treating `1` and `"1"` as equal.
    #[must_use]
    pub fn id_matches(&self, other: &Self) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b || id_text(a) == id_text(b),
            _ => false,
        }
    }
}

fn id_text(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A decoded response or request payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum DecodedBody {
    /// No body
    Empty,
    /// JSON, possibly unwrapped from base64
    Json(Value),
    /// Anything that was not JSON
    Text(String),
}

impl DecodedBody {
    /// Decode a raw body: JSON first, then base64-wrapped JSON, then text.
    ///
    /// Never fails; undecodable payloads degrade to [`DecodedBody::Text`].
    #[must_use]
    pub fn decode(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return Self::Json(value);
        }
        if let Some(value) = decode_base64_json(trimmed) {
            return Self::Json(value);
        }
        Self::Text(raw.to_string())
    }

    /// Convert to a JSON value (text becomes a JSON string, empty becomes null)
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Json(v) => v,
            Self::Text(t) => Value::String(t),
        }
    }

    /// Borrow the JSON value if this body was JSON
    #[must_use]
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }
}

/// Decode a base64 string whose payload is JSON.
#[must_use]
pub fn decode_base64_json(encoded: &str) -> Option<Value> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let text = String::from_utf8(bytes).ok()?;
    serde_json::from_str(&text).ok()
}

/// Milliseconds since the Unix epoch
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// An observed request or response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedEvent {
    /// Request or response
    pub kind: EventKind,
    /// Full URL
    pub url: String,
    /// HTTP method (of the originating request for responses)
    pub method: HttpMethod,
    /// Wall-clock timestamp in milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    /// HTTP status (responses only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Transport-level id pairing a response with its request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Raw body text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Body of the originating request (responses only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    /// Timestamp of the originating request (responses only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timestamp_ms: Option<u64>,
    /// Parsed JSON-RPC envelope of `body`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc: Option<RpcEnvelope>,
}

impl CapturedEvent {
    /// Create an outgoing request event
    #[must_use]
    pub fn request(url: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            kind: EventKind::Request,
            url: url.into(),
            method,
            timestamp_ms: now_ms(),
            status: None,
            request_id: None,
            body: None,
            request_body: None,
            request_timestamp_ms: None,
            rpc: None,
        }
    }

    /// Create an incoming response event
    #[must_use]
    pub fn response(url: impl Into<String>, method: HttpMethod, status: u16) -> Self {
        Self {
            kind: EventKind::Response,
            status: Some(status),
            ..Self::request(url, method)
        }
    }

    /// Set the body, parsing the RPC envelope if there is one
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        self.rpc = RpcEnvelope::parse(&body);
        self.body = Some(body);
        self
    }

    /// Set a JSON body
    #[must_use]
    pub fn with_json(self, value: &Value) -> Self {
        self.with_body(value.to_string())
    }

    /// Attach the originating request body
    #[must_use]
    pub fn with_request_body(mut self, body: impl Into<String>) -> Self {
        self.request_body = Some(body.into());
        self
    }

    /// Set the transport request id
    #[must_use]
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Override the timestamp
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    /// Set the originating request timestamp
    #[must_use]
    pub const fn with_request_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.request_timestamp_ms = Some(timestamp_ms);
        self
    }

    /// Whether this is a request
    #[must_use]
    pub fn is_request(&self) -> bool {
        self.kind == EventKind::Request
    }

    /// Whether this is a response
    #[must_use]
    pub fn is_response(&self) -> bool {
        self.kind == EventKind::Response
    }

    /// Decode the body
    #[must_use]
    pub fn decoded_body(&self) -> DecodedBody {
        self.body
            .as_deref()
            .map_or(DecodedBody::Empty, DecodedBody::decode)
    }

    /// Parse the originating request body as an RPC envelope
    #[must_use]
    pub fn request_rpc(&self) -> Option<RpcEnvelope> {
        self.request_body.as_deref().and_then(RpcEnvelope::parse)
    }

    /// URL path component (without scheme, host or query)
    #[must_use]
    pub fn path(&self) -> &str {
        let without_scheme = self
            .url
            .split_once("://")
            .map_or(self.url.as_str(), |(_, rest)| rest);
        let path = without_scheme
            .find('/')
            .map_or("/", |idx| &without_scheme[idx..]);
        path.split(['?', '#']).next().unwrap_or(path)
    }

    /// Milliseconds between the originating request and this response
    #[must_use]
    pub fn response_time_ms(&self) -> Option<u64> {
        self.request_timestamp_ms
            .map(|start| self.timestamp_ms.saturating_sub(start))
    }
}
