//! Error model and transport-safe serialization.
//!
//! Three kinds of values end up in a route's error slot:
//!
//! - [`ErrorResponse`]: a typed status response produced on purpose (a loader
//!   throwing a 404) or by the loader subsystem itself (no matching route,
//!   bad method). It may wrap an internal [`ServerError`] cause.
//! - [`ServerError`]: an unexpected failure, normalised to an Error shape with
//!   a name, a message and an optional stack.
//! - an arbitrary JSON value thrown by application code.
//!
//! Anything leaving the process goes through [`sanitize_error`] first. Outside
//! development mode messages are replaced with [`UNEXPECTED_SERVER_ERROR`] and
//! stacks are dropped.

use crate::mode::ServerMode;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Generic message shown to clients in place of internal details.
pub const UNEXPECTED_SERVER_ERROR: &str = "Unexpected Server Error";

/// Per-route errors keyed by route id.
pub type RouteErrors = BTreeMap<String, RouteError>;

/// Externally visible error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Error-shaped value carried through result contexts and error hooks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name}: {message}")]
pub struct ServerError {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl ServerError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: "Error".to_string(),
            message: message.into(),
            stack: None,
        }
    }

    /// The generic stand-in used whenever details must not leak.
    #[must_use]
    pub fn unexpected() -> Self {
        Self::new(UNEXPECTED_SERVER_ERROR)
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Normalise an `anyhow` error. The message is the outermost context and
    /// the stack is the full debug rendering (cause chain plus backtrace when
    /// one was captured).
    #[must_use]
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        Self::new(err.to_string()).with_stack(format!("{err:?}"))
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        Self::from_anyhow(&err)
    }
}

impl From<&anyhow::Error> for ServerError {
    fn from(err: &anyhow::Error) -> Self {
        Self::from_anyhow(err)
    }
}

/// Typed status response surfaced as a route error.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub status_text: String,
    pub data: Value,
    /// Produced by the routing layer rather than thrown by application code.
    pub internal: bool,
    /// Underlying cause for internal error responses.
    pub error: Option<ServerError>,
}

impl ErrorResponse {
    /// An intentional error response, e.g. a loader rejecting with a 404.
    #[must_use]
    pub fn new(status: StatusCode, data: Value) -> Self {
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            data,
            internal: false,
            error: None,
        }
    }

    /// An error response wrapping an internal cause.
    #[must_use]
    pub fn internal(status: StatusCode, error: ServerError) -> Self {
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            data: Value::String(error.to_string()),
            internal: true,
            error: Some(error),
        }
    }

    #[must_use]
    pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = status_text.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn has_internal_cause(&self) -> bool {
        self.error.is_some()
    }
}

/// Value stored in a route's error slot.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteError {
    Response(ErrorResponse),
    Error(ServerError),
    Value(Value),
}

impl RouteError {
    /// Whether the error hook should hear about this value. Intentional
    /// error responses without an internal cause are boundary-safe and stay
    /// quiet.
    #[must_use]
    pub fn is_reportable(&self) -> bool {
        match self {
            RouteError::Response(resp) => resp.has_internal_cause(),
            RouteError::Error(_) | RouteError::Value(_) => true,
        }
    }
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::Response(resp) => match &resp.error {
                Some(err) => write!(f, "{} {}: {err}", resp.status.as_u16(), resp.status_text),
                None => write!(f, "{} {}", resp.status.as_u16(), resp.status_text),
            },
            RouteError::Error(err) => write!(f, "{err}"),
            RouteError::Value(value) => write!(f, "{value}"),
        }
    }
}

impl From<ServerError> for RouteError {
    fn from(err: ServerError) -> Self {
        RouteError::Error(err)
    }
}

impl From<ErrorResponse> for RouteError {
    fn from(resp: ErrorResponse) -> Self {
        RouteError::Response(resp)
    }
}

impl From<anyhow::Error> for RouteError {
    fn from(err: anyhow::Error) -> Self {
        RouteError::Error(ServerError::from_anyhow(&err))
    }
}

fn sanitize_server_error(err: &ServerError, mode: ServerMode) -> ServerError {
    if mode.is_development() {
        err.clone()
    } else {
        ServerError::unexpected()
    }
}

/// Strip details from a route error outside development mode.
#[must_use]
pub fn sanitize_error(error: &RouteError, mode: ServerMode) -> RouteError {
    match error {
        RouteError::Error(err) => RouteError::Error(sanitize_server_error(err, mode)),
        RouteError::Response(resp) => {
            let mut resp = resp.clone();
            resp.error = resp.error.as_ref().map(|e| sanitize_server_error(e, mode));
            RouteError::Response(resp)
        }
        RouteError::Value(_) => error.clone(),
    }
}

/// Sanitize every entry of a per-route error map.
#[must_use]
pub fn sanitize_errors(errors: &RouteErrors, mode: ServerMode) -> RouteErrors {
    errors
        .iter()
        .map(|(route_id, err)| (route_id.clone(), sanitize_error(err, mode)))
        .collect()
}

/// Serialize a single error into the `{message, stack}` envelope.
#[must_use]
pub fn serialize_error(error: &ServerError, mode: ServerMode) -> SerializedError {
    let sanitized = sanitize_server_error(error, mode);
    SerializedError {
        message: sanitized.message,
        stack: sanitized.stack,
    }
}

/// Serialize a per-route error map for the client handoff.
///
/// Typed error responses are tagged `RouteErrorResponse` and errors are
/// tagged `Error` so the client can revive them; other values pass through.
#[must_use]
pub fn serialize_errors(errors: Option<&RouteErrors>, mode: ServerMode) -> Option<Value> {
    let errors = errors?;
    let mut serialized = Map::with_capacity(errors.len());
    for (route_id, err) in errors {
        let value = match err {
            RouteError::Response(resp) => json!({
                "status": resp.status.as_u16(),
                "statusText": resp.status_text,
                "internal": resp.internal,
                "data": resp.data,
                "__type": "RouteErrorResponse",
            }),
            RouteError::Error(err) => {
                let sanitized = sanitize_server_error(err, mode);
                let mut obj = Map::new();
                obj.insert("message".to_string(), Value::String(sanitized.message));
                if let Some(stack) = sanitized.stack {
                    obj.insert("stack".to_string(), Value::String(stack));
                }
                obj.insert("__type".to_string(), Value::String("Error".to_string()));
                if sanitized.name != "Error" {
                    obj.insert("__subType".to_string(), Value::String(sanitized.name));
                }
                Value::Object(obj)
            }
            RouteError::Value(value) => value.clone(),
        };
        serialized.insert(route_id.clone(), value);
    }
    Some(Value::Object(serialized))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boom() -> ServerError {
        ServerError::new("boom").with_stack("Error: boom\n    at loader")
    }

    #[test]
    fn test_serialize_error_in_development_keeps_details() {
        let serialized = serialize_error(&boom(), ServerMode::Development);
        assert_eq!(serialized.message, "boom");
        assert!(serialized.stack.unwrap().contains("at loader"));
    }

    #[test]
    fn test_serialize_error_outside_development_is_redacted() {
        for mode in [ServerMode::Production, ServerMode::Test] {
            let serialized = serialize_error(&boom(), mode);
            assert_eq!(serialized.message, UNEXPECTED_SERVER_ERROR);
            assert_eq!(serialized.stack, None);
            let json = serde_json::to_value(&serialized).unwrap();
            assert!(json.get("stack").is_none());
        }
    }

    #[test]
    fn test_sanitize_strips_internal_cause_of_error_response() {
        let resp = ErrorResponse::internal(StatusCode::NOT_FOUND, boom());
        let sanitized = sanitize_error(&RouteError::Response(resp), ServerMode::Production);
        match sanitized {
            RouteError::Response(resp) => {
                assert_eq!(resp.status, StatusCode::NOT_FOUND);
                assert_eq!(resp.error, Some(ServerError::unexpected()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_serialize_errors_shapes() {
        let mut errors = RouteErrors::new();
        errors.insert(
            "routes/a".to_string(),
            RouteError::Response(ErrorResponse::new(StatusCode::NOT_FOUND, json!("gone"))),
        );
        errors.insert(
            "routes/b".to_string(),
            RouteError::Error(boom().with_name("TypeError")),
        );
        errors.insert("routes/c".to_string(), RouteError::Value(json!({"x": 1})));

        let value = serialize_errors(Some(&errors), ServerMode::Development).unwrap();
        assert_eq!(value["routes/a"]["__type"], "RouteErrorResponse");
        assert_eq!(value["routes/a"]["status"], 404);
        assert_eq!(value["routes/a"]["statusText"], "Not Found");
        assert_eq!(value["routes/b"]["__type"], "Error");
        assert_eq!(value["routes/b"]["__subType"], "TypeError");
        assert_eq!(value["routes/b"]["message"], "boom");
        assert_eq!(value["routes/c"], json!({"x": 1}));

        assert!(serialize_errors(None, ServerMode::Production).is_none());
    }

    #[test]
    fn test_reportable() {
        let intentional = RouteError::Response(ErrorResponse::new(StatusCode::NOT_FOUND, Value::Null));
        let internal = RouteError::Response(ErrorResponse::internal(StatusCode::NOT_FOUND, boom()));
        assert!(!intentional.is_reportable());
        assert!(internal.is_reportable());
        assert!(RouteError::Error(boom()).is_reportable());
    }

    #[test]
    fn test_from_anyhow_keeps_cause_chain_in_stack() {
        let err = anyhow::anyhow!("db down").context("loading user");
        let server_error = ServerError::from_anyhow(&err);
        assert_eq!(server_error.message, "loading user");
        assert!(server_error.stack.as_deref().unwrap().contains("db down"));
        assert_eq!(server_error.to_string(), "Error: loading user");
    }
}
