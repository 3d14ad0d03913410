//! Wire-protocol headers and response helpers.
//!
//! The client runtime talks to the dispatcher through a handful of custom
//! headers. Data requests are made with `fetch`, which cannot observe a
//! redirect it followed, so redirects are re-encoded as headers on a 204.

use crate::body::{Body, Response};
use crate::mode::ServerMode;
use http::header::{CONTENT_TYPE, LOCATION, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;
use std::fmt::Display;
use tracing::{error, warn};

/// Query parameter selecting data mode.
pub const DATA_QUERY_PARAM: &str = "_data";

/// Marks a genuine framework-produced response.
pub const X_REMIX_RESPONSE: HeaderName = HeaderName::from_static("x-remix-response");
/// Carries the `Location` of a re-encoded redirect.
pub const X_REMIX_REDIRECT: HeaderName = HeaderName::from_static("x-remix-redirect");
/// Carries the original status of a re-encoded redirect.
pub const X_REMIX_STATUS: HeaderName = HeaderName::from_static("x-remix-status");
/// Asks the client to revalidate other route data after a redirect.
pub const X_REMIX_REVALIDATE: HeaderName = HeaderName::from_static("x-remix-revalidate");
/// Marks a thrown response surfaced verbatim.
pub const X_REMIX_CATCH: HeaderName = HeaderName::from_static("x-remix-catch");
/// Marks a synthesized error response.
pub const X_REMIX_ERROR: HeaderName = HeaderName::from_static("x-remix-error");

pub const YES: HeaderValue = HeaderValue::from_static("yes");

pub const CONTENT_TYPE_DEFERRED: &str = "text/remix-deferred";
pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

/// Reason phrase of a synthesized response whose status text differs from
/// the canonical one. Carried in the response extensions for the server
/// layer, since `http` only knows canonical reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusText(pub String);

/// Status codes treated as redirects.
#[inline]
#[must_use]
pub fn is_redirect_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// A redirect status carrying a `Location` header.
#[must_use]
pub fn is_redirect_response(response: &Response) -> bool {
    is_redirect_status(response.status()) && response.headers().contains_key(LOCATION)
}

/// A redirect produced by a loader or action.
#[derive(Debug, Clone, PartialEq)]
pub struct Redirect {
    pub status: StatusCode,
    pub location: String,
    /// Remaining headers of the original response (without `Location`).
    pub headers: HeaderMap,
}

impl Redirect {
    #[must_use]
    pub fn new(location: impl Into<String>, status: StatusCode) -> Self {
        Self {
            status,
            location: location.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Split a redirect response into its parts, handing back anything
    /// that is not a redirect untouched.
    pub fn from_response(response: Response) -> Result<Self, Response> {
        if !is_redirect_response(&response) {
            return Err(response);
        }
        let (parts, _body) = response.into_parts();
        let mut headers = parts.headers;
        let location = headers
            .remove(LOCATION)
            .and_then(|v| v.to_str().ok().map(str::to_owned))
            .unwrap_or_default();
        Ok(Self {
            status: parts.status,
            location,
            headers,
        })
    }

    #[must_use]
    pub fn sets_cookie(&self) -> bool {
        self.headers.contains_key(SET_COOKIE)
    }

    /// Plain HTTP redirect, as returned in document and resource mode.
    #[must_use]
    pub fn into_response(self) -> Response {
        let mut headers = self.headers;
        insert_header(&mut headers, LOCATION, &self.location);
        build_response(self.status, headers, Body::Empty)
    }

    /// Redirect re-encoded for a data request: a 204 whose headers tell the
    /// client where to go and whether to revalidate.
    #[must_use]
    pub fn into_data_response(self) -> Response {
        let revalidate = self.sets_cookie();
        let mut headers = self.headers;
        headers.remove(LOCATION);
        insert_header(&mut headers, X_REMIX_REDIRECT, &self.location);
        headers.insert(X_REMIX_STATUS, HeaderValue::from(self.status.as_u16()));
        if revalidate {
            headers.insert(X_REMIX_REVALIDATE, YES);
        }
        build_response(StatusCode::NO_CONTENT, headers, Body::Empty)
    }
}

/// Insert a header from a runtime string, dropping it with a warning when
/// the value is not a legal header value.
pub fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(name, v);
        }
        Err(e) => warn!(header = %name, error = %e, "Dropping invalid header value"),
    }
}

/// Assemble a response from parts.
#[must_use]
pub fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Serialize `value` as a JSON response. Serialization failure degrades to
/// a bare 500.
pub fn json_response<T: Serialize + ?Sized>(
    value: &T,
    status: StatusCode,
    mut headers: HeaderMap,
) -> Response {
    match serde_json::to_vec(value) {
        Ok(bytes) => {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
            build_response(status, headers, Body::from(bytes))
        }
        Err(e) => {
            error!(error = %e, "Failed to serialize JSON response body");
            build_response(StatusCode::INTERNAL_SERVER_ERROR, HeaderMap::new(), Body::Empty)
        }
    }
}

/// Plain text response.
#[must_use]
pub fn text_response(body: String, status: StatusCode) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_TEXT));
    build_response(status, headers, Body::from(body))
}

/// The response of last resort once every other path has failed. Only the
/// production mode hides the stringified error.
#[must_use]
pub fn last_resort_error_response(error: &dyn Display, mode: ServerMode) -> Response {
    let mut message = crate::errors::UNEXPECTED_SERVER_ERROR.to_string();
    if !mode.is_production() {
        message.push_str("\n\n");
        message.push_str(&error.to_string());
    }
    text_response(message, StatusCode::INTERNAL_SERVER_ERROR)
}

/// Add a `yes` marker header.
pub fn mark(response: &mut Response, marker: HeaderName) {
    response.headers_mut().insert(marker, YES);
}
