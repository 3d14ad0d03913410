//! Request-scoped data and the loader subsystem seam.
//!
//! The loader subsystem (route matching plus loader/action execution) is an
//! external collaborator. The dispatcher only sees the [`StaticHandler`]
//! trait and the tagged results it returns: a loader either produces a
//! [`RouteOutcome`] or fails with a [`Thrown`] value, and the dispatcher
//! pattern-matches on those instead of inspecting what was thrown.

use crate::body::{Request, Response};
use crate::deferred::DeferredData;
use crate::errors::{sanitize_errors, ErrorResponse, RouteError, RouteErrors};
use crate::mode::ServerMode;
use crate::responses::Redirect;
use crate::router::RouteMatch;
use async_trait::async_trait;
use http::{Extensions, HeaderMap, StatusCode};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Caller-owned bag of request-scoped values (authenticated user, database
/// handles, ...). Passed by reference through a whole request and never
/// mutated by the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct LoadContext(Extensions);

impl LoadContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous value of the same type.
    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.0.insert(value)
    }

    #[must_use]
    pub fn with<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.0.insert(value);
        self
    }

    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.0.get::<T>()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The request's cancellation signal.
///
/// Servers attach a [`CancellationToken`] to the request extensions and
/// cancel it when the client disconnects. Requests without one get a token
/// that never fires.
#[must_use]
pub fn request_signal(request: &Request) -> CancellationToken {
    request
        .extensions()
        .get::<CancellationToken>()
        .cloned()
        .unwrap_or_default()
}

/// Successful result of resolving a single route.
pub enum RouteOutcome {
    /// A redirect, returned or thrown by the loader.
    Redirect(Redirect),
    /// Any other terminal response.
    Response(Response),
    /// Critical values plus values that stream in later.
    Deferred(DeferredData),
    /// A bare value that still needs encoding.
    Value(Value),
}

impl RouteOutcome {
    /// Classify a loader response, lifting redirects into their own variant.
    #[must_use]
    pub fn from_response(response: Response) -> Self {
        match Redirect::from_response(response) {
            Ok(redirect) => RouteOutcome::Redirect(redirect),
            Err(response) => RouteOutcome::Response(response),
        }
    }

    /// Short label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            RouteOutcome::Redirect(_) => "redirect",
            RouteOutcome::Response(_) => "response",
            RouteOutcome::Deferred(_) => "deferred",
            RouteOutcome::Value(_) => "value",
        }
    }
}

impl From<Response> for RouteOutcome {
    fn from(response: Response) -> Self {
        RouteOutcome::from_response(response)
    }
}

impl From<Redirect> for RouteOutcome {
    fn from(redirect: Redirect) -> Self {
        RouteOutcome::Redirect(redirect)
    }
}

impl From<DeferredData> for RouteOutcome {
    fn from(data: DeferredData) -> Self {
        RouteOutcome::Deferred(data)
    }
}

impl From<Value> for RouteOutcome {
    fn from(value: Value) -> Self {
        RouteOutcome::Value(value)
    }
}

impl fmt::Debug for RouteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteOutcome::Redirect(r) => f.debug_tuple("Redirect").field(r).finish(),
            RouteOutcome::Response(r) => f.debug_tuple("Response").field(&r.status()).finish(),
            RouteOutcome::Deferred(d) => f.debug_tuple("Deferred").field(&d.pending_keys()).finish(),
            RouteOutcome::Value(v) => f.debug_tuple("Value").field(v).finish(),
        }
    }
}

/// Failure of a single-route resolution.
#[derive(Debug)]
pub enum Thrown {
    /// An intentional short-circuit (e.g. an auth redirect thrown from a
    /// loader). Not an error.
    Response(Response),
    /// A typed error response, produced by application code or by the
    /// loader subsystem itself (404 no match, 405 bad method, ...).
    ErrorResponse(ErrorResponse),
    /// Anything else.
    Error(anyhow::Error),
}

impl From<Response> for Thrown {
    fn from(response: Response) -> Self {
        Thrown::Response(response)
    }
}

impl From<ErrorResponse> for Thrown {
    fn from(err: ErrorResponse) -> Self {
        Thrown::ErrorResponse(err)
    }
}

impl From<anyhow::Error> for Thrown {
    fn from(err: anyhow::Error) -> Self {
        Thrown::Error(err)
    }
}

/// Aggregate outcome of resolving every matched route for a document.
///
/// A route id is present in at most one of the loader data and the errors.
#[derive(Debug, Clone)]
pub struct ResultContext {
    /// Resolved URL path.
    pub location: String,
    pub status_code: StatusCode,
    /// Matched routes, root first.
    pub matches: Vec<RouteMatch>,
    loader_data: BTreeMap<String, Value>,
    pub action_data: Option<BTreeMap<String, Value>>,
    errors: Option<RouteErrors>,
    pub loader_headers: BTreeMap<String, HeaderMap>,
    pub action_headers: BTreeMap<String, HeaderMap>,
}

impl ResultContext {
    #[must_use]
    pub fn new(location: impl Into<String>, matches: Vec<RouteMatch>) -> Self {
        Self {
            location: location.into(),
            status_code: StatusCode::OK,
            matches,
            loader_data: BTreeMap::new(),
            action_data: None,
            errors: None,
            loader_headers: BTreeMap::new(),
            action_headers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status_code = status;
        self
    }

    /// Record a route's loaded value, clearing any error for that route.
    pub fn set_loader_data(&mut self, route_id: impl Into<String>, value: Value) {
        let route_id = route_id.into();
        if let Some(errors) = self.errors.as_mut() {
            errors.remove(&route_id);
            if errors.is_empty() {
                self.errors = None;
            }
        }
        self.loader_data.insert(route_id, value);
    }

    /// Record a route's error, clearing any loaded value for that route.
    pub fn set_error(&mut self, route_id: impl Into<String>, error: RouteError) {
        let route_id = route_id.into();
        self.loader_data.remove(&route_id);
        self.errors
            .get_or_insert_with(RouteErrors::new)
            .insert(route_id, error);
    }

    #[must_use]
    pub fn loader_data(&self) -> &BTreeMap<String, Value> {
        &self.loader_data
    }

    #[must_use]
    pub fn errors(&self) -> Option<&RouteErrors> {
        self.errors.as_ref()
    }

    /// Replace every error with its sanitized form for `mode`.
    pub fn sanitize_errors(&mut self, mode: ServerMode) {
        if let Some(errors) = self.errors.as_ref() {
            self.errors = Some(sanitize_errors(errors, mode));
        }
    }

    /// Matches that render: everything up to and including the first route
    /// holding an error, or every match when there are no errors.
    #[must_use]
    pub fn rendered_matches(&self) -> &[RouteMatch] {
        let errored = self.errors.as_ref().and_then(|errors| {
            self.matches
                .iter()
                .position(|m| errors.contains_key(m.route_id()))
        });
        match errored {
            Some(idx) => &self.matches[..=idx],
            None => &self.matches,
        }
    }

    /// Id of the deepest rendered route able to render an error, falling
    /// back to the root match.
    #[must_use]
    pub fn deepest_rendered_boundary_id(&self) -> Option<&str> {
        self.rendered_matches()
            .iter()
            .rev()
            .find(|m| m.route.module.error_boundary)
            .or_else(|| self.matches.first())
            .map(RouteMatch::route_id)
    }
}

/// Result of a full-tree query.
#[derive(Debug)]
pub enum QueryResult {
    Context(ResultContext),
    /// The query short-circuited (e.g. a top-level redirect).
    Response(Response),
}

/// The loader subsystem as seen by the dispatcher.
#[async_trait]
pub trait StaticHandler: Send + Sync {
    /// Resolve one route's loader or action.
    async fn query_route(
        &self,
        request: &Request,
        route_id: &str,
        context: &LoadContext,
    ) -> Result<RouteOutcome, Thrown>;

    /// Resolve every matched route for a document request.
    async fn query(&self, request: &Request, context: &LoadContext) -> anyhow::Result<QueryResult>;

    /// Derive a context that renders `error` at the deepest available error
    /// boundary. Replaces any previous errors and forces a 500.
    fn context_from_error(&self, context: &ResultContext, error: RouteError) -> ResultContext {
        let boundary_id = context
            .deepest_rendered_boundary_id()
            .unwrap_or("root")
            .to_string();
        let mut next = context.clone();
        next.errors = None;
        next.status_code = StatusCode::INTERNAL_SERVER_ERROR;
        next.set_error(boundary_id, error);
        next
    }
}
