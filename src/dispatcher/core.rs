use crate::body::{Body, Request, Response};
use crate::build::{BuildSource, ErrorHandler, HookArgs, ServerBuild};
use crate::data::{request_signal, LoadContext, StaticHandler};
use crate::entry::{create_entry_route_modules, EntryRouteModules};
use crate::errors::{ErrorResponse, RouteError, ServerError};
use crate::ids::RequestId;
use crate::mode::ServerMode;
use crate::responses::{last_resort_error_response, DATA_QUERY_PARAM};
use crate::router::{ParamVec, RouteMatch, RouteTable, RouteTableError};
use crate::runtime_config::RuntimeConfig;
use arc_swap::ArcSwapOption;
use http::{Method, Uri};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::modes::{handle_data_request, handle_document_request, handle_resource_request};

/// Failures of the dispatcher itself, as opposed to failures of app code.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to load server build: {0:#}")]
    Build(#[source] anyhow::Error),
    #[error("invalid route manifest: {0}")]
    Routes(#[from] RouteTableError),
    #[error("expected a Response to be returned from query_route, got a {0}")]
    NotAResponse(&'static str),
}

impl DispatchError {
    /// The error as it is reported and rendered.
    #[must_use]
    pub fn to_route_error(&self) -> RouteError {
        RouteError::Error(ServerError::new(self.to_string()))
    }
}

/// Read-only state derived from a build.
///
/// Shared by every request dispatched against the same build.
pub struct Derivation {
    pub build: Arc<ServerBuild>,
    pub routes: RouteTable,
    pub route_modules: Arc<EntryRouteModules>,
    pub static_handler: Arc<dyn StaticHandler>,
    pub error_handler: ErrorHandler,
    pub mode: ServerMode,
}

/// Compile the route table, create the loader subsystem and pick the error
/// handler for `build`.
pub fn derive(build: Arc<ServerBuild>, mode: ServerMode) -> Result<Derivation, DispatchError> {
    let routes = RouteTable::new(build.routes.clone())?;
    let route_modules = Arc::new(create_entry_route_modules(&routes));
    let static_handler = (build.static_handler)(&routes);
    let error_handler = build
        .entry
        .handle_error
        .clone()
        .unwrap_or_else(|| default_error_handler(mode));

    debug!(
        routes_count = routes.len(),
        mode = %mode,
        custom_error_handler = build.entry.handle_error.is_some(),
        "Build derived"
    );

    Ok(Derivation {
        build,
        routes,
        route_modules,
        static_handler,
        error_handler,
        mode,
    })
}

/// Logs reported errors unless running tests or the client already went away.
///
/// For error responses wrapping an internal cause, the cause is logged.
#[must_use]
pub fn default_error_handler(mode: ServerMode) -> ErrorHandler {
    Arc::new(move |err: &RouteError, args: &HookArgs<'_>| {
        if mode == ServerMode::Test || request_signal(args.request).is_cancelled() {
            return;
        }
        match err {
            RouteError::Response(ErrorResponse {
                error: Some(cause), ..
            }) => error!(error = %cause, stack = ?cause.stack, "Unhandled error"),
            RouteError::Error(e) => error!(error = %e, stack = ?e.stack, "Unhandled error"),
            other => error!(error = %other, "Unhandled error"),
        }
    })
}

/// Forwards reportable errors to the error handler with the request's
/// hook arguments.
pub(crate) struct ErrorReporter<'a> {
    handler: &'a ErrorHandler,
    args: HookArgs<'a>,
}

impl ErrorReporter<'_> {
    pub(crate) fn report(&self, err: &RouteError) {
        (self.handler)(err, &self.args);
    }
}

/// How a request will be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestMode {
    /// `?_data=<route id>`: one route's data for client navigation.
    Data { route_id: String },
    /// The leaf route renders nothing; its loader/action answers directly.
    Resource { route_id: String },
    /// Full HTML document.
    Document,
}

impl RequestMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMode::Data { .. } => "data",
            RequestMode::Resource { .. } => "resource",
            RequestMode::Document => "document",
        }
    }
}

/// Value of the `_data` query parameter, if present.
#[must_use]
pub fn data_route_id(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == DATA_QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
}

/// Classify a request. The first matching rule wins: data, resource,
/// document.
#[must_use]
pub fn classify_request(uri: &Uri, matches: Option<&[RouteMatch]>) -> RequestMode {
    if let Some(route_id) = data_route_id(uri) {
        return RequestMode::Data { route_id };
    }
    match matches.and_then(<[RouteMatch]>::last) {
        Some(leaf) if leaf.route.module.is_resource() => RequestMode::Resource {
            route_id: leaf.route.id.clone(),
        },
        _ => RequestMode::Document,
    }
}

/// Drop the body, keeping status and headers.
#[must_use]
pub fn strip_body_for_head(response: Response) -> Response {
    let (parts, _body) = response.into_parts();
    Response::from_parts(parts, Body::Empty)
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct HandleOptions {
    /// Critical CSS inlined by the renderer on the first render attempt.
    pub critical_css: Option<String>,
}

/// Turns requests into responses against a build.
///
/// `handle` never fails: every failure along the way ends up as a
/// response.
pub struct RequestHandler {
    source: BuildSource,
    mode: ServerMode,
    /// Cached derivation of a static build.
    current: ArcSwapOption<Derivation>,
}

impl RequestHandler {
    #[must_use]
    pub fn new(build: impl Into<BuildSource>, mode: ServerMode) -> Self {
        let source = build.into();
        info!(
            mode = %mode,
            dynamic_build = source.is_dynamic(),
            "Request handler created"
        );
        Self {
            source,
            mode,
            current: ArcSwapOption::empty(),
        }
    }

    /// Create a handler whose mode comes from the environment.
    #[must_use]
    pub fn from_env(build: impl Into<BuildSource>) -> Self {
        Self::new(build, RuntimeConfig::from_env().server_mode())
    }

    #[must_use]
    pub fn mode(&self) -> ServerMode {
        self.mode
    }

    /// The derivation requests are dispatched against. Static builds derive
    /// once and reuse the result; dynamic builds derive on every call and
    /// are never cached.
    pub async fn derivation(&self) -> Result<Arc<Derivation>, DispatchError> {
        let dynamic = self.source.is_dynamic();
        if !dynamic {
            if let Some(current) = self.current.load_full() {
                return Ok(current);
            }
        }

        let build = self.source.load().await.map_err(DispatchError::Build)?;
        let start = Instant::now();
        let derived = Arc::new(derive(build, self.mode)?);
        if dynamic {
            debug!(
                duration_us = start.elapsed().as_micros(),
                "Dynamic build re-derived"
            );
        } else {
            self.current.store(Some(Arc::clone(&derived)));
        }
        Ok(derived)
    }

    /// Classify a request against the current derivation without handling
    /// it.
    pub async fn classify(&self, request: &Request) -> Result<(RequestMode, Option<Vec<RouteMatch>>), DispatchError> {
        let derived = self.derivation().await?;
        let matches = derived.routes.match_routes(request.uri().path());
        Ok((classify_request(request.uri(), matches.as_deref()), matches))
    }

    pub async fn handle(&self, request: Request, load_context: &LoadContext) -> Response {
        self.handle_with_options(request, load_context, HandleOptions::default())
            .await
    }

    pub async fn handle_with_options(
        &self,
        request: Request,
        load_context: &LoadContext,
        options: HandleOptions,
    ) -> Response {
        let request_id = RequestId::from_headers(request.headers());
        let span = info_span!(
            "remix_request",
            request_id = %request_id,
            method = %request.method(),
            path = %request.uri().path(),
        );
        self.dispatch(request, load_context, options)
            .instrument(span)
            .await
    }

    async fn dispatch(
        &self,
        request: Request,
        load_context: &LoadContext,
        options: HandleOptions,
    ) -> Response {
        let start = Instant::now();
        let is_head = request.method() == Method::HEAD;

        let derived = match self.derivation().await {
            Ok(derived) => derived,
            Err(e) => {
                error!(error = %e, "Failed to derive request handler state");
                let handler = default_error_handler(self.mode);
                let params = ParamVec::new();
                handler(
                    &e.to_route_error(),
                    &HookArgs {
                        context: load_context,
                        params: &params,
                        request: &request,
                    },
                );
                let response = last_resort_error_response(&e, self.mode);
                return if is_head {
                    strip_body_for_head(response)
                } else {
                    response
                };
            }
        };

        let matches = derived.routes.match_routes(request.uri().path());
        let root_params = matches
            .as_ref()
            .and_then(|m| m.first())
            .map(|m| m.params.clone())
            .unwrap_or_default();
        let reporter = ErrorReporter {
            handler: &derived.error_handler,
            args: HookArgs {
                context: load_context,
                params: &root_params,
                request: &request,
            },
        };

        let mode = classify_request(request.uri(), matches.as_deref());
        debug!(
            mode = mode.as_str(),
            matched_routes = matches.as_ref().map_or(0, Vec::len),
            "Request classified"
        );

        let response = match &mode {
            RequestMode::Data { route_id } => {
                let response =
                    handle_data_request(&derived, route_id, &request, load_context, &reporter)
                        .await;
                match derived.build.entry.handle_data_request.as_ref() {
                    Some(hook) => {
                        let params = matches
                            .as_ref()
                            .and_then(|m| m.iter().find(|m| m.route_id() == route_id))
                            .map(|m| m.params.clone())
                            .unwrap_or_default();
                        let args = HookArgs {
                            context: load_context,
                            params: &params,
                            request: &request,
                        };
                        match hook.handle_data_request(response, args).await {
                            Ok(response) => response,
                            Err(e) => {
                                warn!(route_id = %route_id, error = %e, "Data request hook failed");
                                let err = ServerError::from_anyhow(&e);
                                reporter.report(&RouteError::Error(err.clone()));
                                last_resort_error_response(&err, derived.mode)
                            }
                        }
                    }
                    None => response,
                }
            }
            RequestMode::Resource { route_id } => {
                handle_resource_request(&derived, route_id, &request, load_context, &reporter).await
            }
            RequestMode::Document => {
                handle_document_request(
                    &derived,
                    &request,
                    load_context,
                    &reporter,
                    options.critical_css.as_deref(),
                )
                .await
            }
        };

        info!(
            mode = mode.as_str(),
            status = response.status().as_u16(),
            streaming = response.body().is_stream(),
            latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Request handled"
        );

        if is_head {
            strip_body_for_head(response)
        } else {
            response
        }
    }
}
