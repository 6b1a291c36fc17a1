//! The JSON response envelope.
//!
//! Every answer this framework produces (apart from the raw 429 rejection and
//! the empty preflight reply) has the same shape:
//!
//! ```json
//! {"status": true, "message": "Operation completed successfully", "data": {..}, "error": []}
//! ```
//!
//! A [`ResponseType`] selects the canonical message and status code. Callers
//! may override message, status and data for one response; the canonical
//! table itself is a `match` and cannot be changed at runtime, so an override
//! never leaks into the next request.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::response::Response;

/// Symbolic outcome of a request.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ResponseType {
    Success,
    Error,
    BadRequest,
    NotFound,
    NotAuth,
    Forbidden,
    MethodNotAllowed,
    ValidationError,
}

impl ResponseType {
    pub const ALL: [Self; 8] = [
        Self::Success,
        Self::Error,
        Self::BadRequest,
        Self::NotFound,
        Self::NotAuth,
        Self::Forbidden,
        Self::MethodNotAllowed,
        Self::ValidationError,
    ];

    /// The configuration key, e.g. `"not_found"`.
    pub fn key(self) -> &'static str {
        match self {
            Self::Success          => "success",
            Self::Error            => "error",
            Self::BadRequest       => "bad_request",
            Self::NotFound         => "not_found",
            Self::NotAuth          => "not_auth",
            Self::Forbidden        => "forbidden",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::ValidationError  => "validation_error",
        }
    }

    /// Canonical HTTP status code.
    pub fn status(self) -> u16 {
        match self {
            Self::Success          => 200,
            Self::Error            => 500,
            Self::BadRequest       => 400,
            Self::NotFound         => 404,
            Self::NotAuth          => 401,
            Self::Forbidden        => 403,
            Self::MethodNotAllowed => 405,
            Self::ValidationError  => 422,
        }
    }

    /// Canonical envelope message.
    pub fn message(self) -> &'static str {
        match self {
            Self::Success          => "Operation completed successfully",
            Self::Error            => "An error occurred",
            Self::BadRequest       => "Bad request",
            Self::NotFound         => "Resource not found",
            Self::NotAuth          => "Unauthorized request",
            Self::Forbidden        => "You don't have the permission to access the requested resource",
            Self::MethodNotAllowed => "Used method not allowed",
            Self::ValidationError  => "Validation error",
        }
    }

    /// Canonical `error.message` detail; `None` for success.
    fn detail(self) -> Option<&'static str> {
        match self {
            Self::Success          => None,
            Self::Error            => Some("An error occurred while processing the request"),
            Self::BadRequest       => Some("The client made a bad request to the server"),
            Self::NotFound         => Some("The client requested a non-existent (or moved) resource"),
            Self::NotAuth          => Some("You're not allowed to access this resource"),
            Self::Forbidden        => Some("You don't have the permission to access the requested resource"),
            Self::MethodNotAllowed => Some("The method you called is not allowed on the requested resource"),
            Self::ValidationError  => Some("The data you passed didn't satisfy validation requirments"),
        }
    }

    /// Resolves a key case-insensitively, falling back to [`ResponseType::Error`]
    /// (with a warning) when the key is unknown.
    pub fn lookup(key: &str) -> Self {
        key.parse().unwrap_or_else(|e: UnknownResponseType| {
            warn!(response_type = %e.0, "unknown response type, answering with `error`");
            Self::Error
        })
    }
}

impl FromStr for ResponseType {
    type Err = UnknownResponseType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.key() == lowered)
            .ok_or_else(|| UnknownResponseType(s.to_owned()))
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("unknown response type `{0}`")]
pub struct UnknownResponseType(pub String);

// ── Envelope ──────────────────────────────────────────────────────────────────

/// The wire body: `{status, message, data, error}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub status: bool,
    pub message: String,
    pub data: Value,
    pub error: Value,
}

impl Envelope {
    /// A fresh copy of the canonical envelope for `kind`.
    pub fn canonical(kind: ResponseType) -> Self {
        Self {
            status: kind == ResponseType::Success,
            message: kind.message().to_owned(),
            data: json!([]),
            error: match kind.detail() {
                Some(detail) => json!({ "message": detail }),
                None => json!([]),
            },
        }
    }
}

// ── Reply ─────────────────────────────────────────────────────────────────────

/// Builder for one envelope response.
///
/// ```rust
/// use routify::{Reply, ResponseType};
///
/// let res = Reply::new(ResponseType::NotFound)
///     .message("Order not found for the given UUID.")
///     .finish();
/// assert_eq!(res.status_code(), 404);
/// ```
#[derive(Debug)]
pub struct Reply {
    kind: ResponseType,
    data: Option<Result<Value, serde_json::Error>>,
    message: Option<String>,
    status: Option<u16>,
}

impl Reply {
    pub fn new(kind: ResponseType) -> Self {
        Self { kind, data: None, message: None, status: None }
    }

    pub fn success() -> Self {
        Self::new(ResponseType::Success)
    }

    /// Attaches a payload. Empty payloads (`null`, `""`, `[]`, `{}`) leave the
    /// default `[]` in place.
    pub fn data(mut self, data: impl Serialize) -> Self {
        self.data = Some(serde_json::to_value(data));
        self
    }

    /// Overrides the message for this response only. An empty string keeps
    /// the canonical one.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Overrides the status code for this response only. `0` keeps the
    /// canonical one.
    pub fn status(mut self, code: u16) -> Self {
        self.status = Some(code);
        self
    }

    pub fn finish(self) -> Response {
        let mut envelope = Envelope::canonical(self.kind);

        match self.data {
            Some(Ok(value)) if !is_empty(&value) => envelope.data = value,
            Some(Err(e)) => {
                warn!(error = %e, response_type = %self.kind, "response data is not serializable");
                return canonical_error();
            }
            _ => {}
        }

        if let Some(message) = self.message.filter(|m| !m.is_empty()) {
            envelope.message = message;
        }

        let mut status = self.kind.status();
        match self.status {
            None | Some(0) => {}
            Some(code @ 100..=999) => status = code,
            Some(code) => warn!(status = code, "ignoring invalid status override"),
        }

        match serde_json::to_vec(&envelope) {
            Ok(body) => Response::builder().status(status).json(body),
            Err(e) => {
                warn!(error = %e, "envelope serialization failed");
                canonical_error()
            }
        }
    }
}

/// Builds the envelope response for `kind`, applying the optional overrides.
///
/// `kind` is a response-type key such as `"success"` or `"not_found"`;
/// unknown keys answer like `"error"`. Pass `()` as `data` when there is no
/// payload.
///
/// ```rust
/// use routify::respond;
/// use serde_json::json;
///
/// let res = respond("success", json!({"x": 1}), None, None);
/// assert_eq!(res.status_code(), 200);
/// assert_eq!(
///     res.body(),
///     br#"{"status":true,"message":"Operation completed successfully","data":{"x":1},"error":[]}"#,
/// );
/// ```
pub fn respond(
    kind: &str,
    data: impl Serialize,
    message: Option<&str>,
    status: Option<u16>,
) -> Response {
    let mut reply = Reply::new(ResponseType::lookup(kind)).data(data);
    if let Some(message) = message {
        reply = reply.message(message);
    }
    if let Some(status) = status {
        reply = reply.status(status);
    }
    reply.finish()
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn canonical_error() -> Response {
    let kind = ResponseType::Error;
    let body = serde_json::to_vec(&Envelope::canonical(kind)).unwrap_or_else(|_| {
        br#"{"status":false,"message":"An error occurred","data":[],"error":[]}"#.to_vec()
    });
    Response::builder().status(kind.status()).json(body)
}
