#![allow(dead_code)]

//! Shared fixtures: an in-memory loader subsystem, a recording renderer and
//! a small app wired from them.

use async_trait::async_trait;
use futures::FutureExt;
use http::header::{CONTENT_TYPE, LOCATION, SET_COOKIE};
use http::{HeaderMap, Method, StatusCode};
use parking_lot::Mutex;
use remix_server_runtime::body::{Body, Request, Response};
use remix_server_runtime::build::{
    AssetsManifest, DocumentRenderer, EntryModule, ErrorHandler, HookArgs, ServerBuild,
};
use remix_server_runtime::data::{
    LoadContext, QueryResult, ResultContext, RouteOutcome, StaticHandler, Thrown,
};
use remix_server_runtime::entry::EntryContext;
use remix_server_runtime::errors::{ErrorResponse, RouteError, ServerError};
use remix_server_runtime::responses::Redirect;
use remix_server_runtime::router::{
    DataFunction, DataFunctionArgs, ParamVec, RouteMatch, RouteModule, RouteTable, ServerRoute,
};
use remix_server_runtime::{DeferredData, RequestHandler, ServerMode};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;

pub fn loader<F, Fut>(f: F) -> DataFunction
where
    F: Fn(DataFunctionArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<RouteOutcome, Thrown>> + Send + 'static,
{
    Arc::new(move |args| f(args).boxed())
}

pub fn redirect(status: u16, location: &str) -> Response {
    http::Response::builder()
        .status(status)
        .header(LOCATION, location)
        .body(Body::Empty)
        .unwrap()
}

pub fn get(uri: &str) -> Request {
    http::Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::Empty)
        .unwrap()
}

pub fn head(uri: &str) -> Request {
    http::Request::builder()
        .method(Method::HEAD)
        .uri(uri)
        .body(Body::Empty)
        .unwrap()
}

pub async fn body_string(response: Response) -> String {
    let bytes = response.into_body().collect().await;
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

/// Parse the handoff embedded by [`TestRenderer`].
pub fn handoff_json(html: &str) -> Value {
    let start = html.find("window.__remixContext = ").unwrap() + "window.__remixContext = ".len();
    let end = start + html[start..].find(";</script>").unwrap();
    serde_json::from_str(&html[start..end]).unwrap()
}

/// Loader subsystem over a route table: loaders run for GET/HEAD, actions
/// otherwise, and failures land on the nearest error boundary.
pub struct FakeStaticHandler {
    routes: RouteTable,
}

impl FakeStaticHandler {
    pub fn new(routes: &RouteTable) -> Self {
        Self {
            routes: routes.clone(),
        }
    }

    fn args(request: &Request, params: ParamVec, context: &LoadContext) -> DataFunctionArgs {
        DataFunctionArgs {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
            params,
            context: context.clone(),
        }
    }

    fn boundary_for(matches: &[RouteMatch], idx: usize) -> String {
        matches[..=idx]
            .iter()
            .rev()
            .find(|m| m.route.module.error_boundary)
            .unwrap_or(&matches[0])
            .route_id()
            .to_string()
    }
}

#[async_trait]
impl StaticHandler for FakeStaticHandler {
    async fn query_route(
        &self,
        request: &Request,
        route_id: &str,
        context: &LoadContext,
    ) -> Result<RouteOutcome, Thrown> {
        let Some(route) = self.routes.route(route_id) else {
            return Err(ErrorResponse::internal(
                StatusCode::FORBIDDEN,
                ServerError::new(format!("Route \"{route_id}\" does not match URL")),
            )
            .into());
        };
        let params = self
            .routes
            .match_routes(request.uri().path())
            .and_then(|m| m.into_iter().find(|m| m.route_id() == route_id))
            .map(|m| m.params)
            .unwrap_or_default();
        let is_read = matches!(*request.method(), Method::GET | Method::HEAD);
        let function = if is_read {
            route.module.loader.clone()
        } else {
            route.module.action.clone()
        };
        match function {
            Some(f) => f(Self::args(request, params, context)).await,
            None => Err(ErrorResponse::internal(
                if is_read {
                    StatusCode::BAD_REQUEST
                } else {
                    StatusCode::METHOD_NOT_ALLOWED
                },
                ServerError::new(format!("No loader or action for route \"{route_id}\"")),
            )
            .into()),
        }
    }

    async fn query(&self, request: &Request, context: &LoadContext) -> anyhow::Result<QueryResult> {
        let path = request.uri().path().to_string();
        let Some(matches) = self.routes.match_routes(&path) else {
            let root = self
                .routes
                .route("root")
                .ok_or_else(|| anyhow::anyhow!("no root route"))?;
            let mut ctx = ResultContext::new(
                path.clone(),
                vec![RouteMatch {
                    route: Arc::clone(root),
                    params: ParamVec::new(),
                }],
            )
            .with_status(StatusCode::NOT_FOUND);
            ctx.set_error(
                "root",
                ErrorResponse::internal(
                    StatusCode::NOT_FOUND,
                    ServerError::new(format!("No route matches URL \"{path}\"")),
                )
                .into(),
            );
            return Ok(QueryResult::Context(ctx));
        };

        let mut ctx = ResultContext::new(path, matches.clone());
        for (idx, m) in matches.iter().enumerate() {
            let Some(loader) = m.route.module.loader.clone() else {
                continue;
            };
            let id = m.route_id().to_string();
            match loader(Self::args(request, m.params.clone(), context)).await {
                Ok(RouteOutcome::Value(value)) => ctx.set_loader_data(id, value),
                Ok(RouteOutcome::Redirect(r)) => return Ok(QueryResult::Response(r.into_response())),
                Ok(RouteOutcome::Response(r)) => {
                    ctx.loader_headers.insert(id.clone(), r.headers().clone());
                    let body = r.into_body().collect().await;
                    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
                    ctx.set_loader_data(id, value);
                }
                Ok(RouteOutcome::Deferred(data)) => {
                    let critical: serde_json::Map<String, Value> = data
                        .entries()
                        .iter()
                        .filter_map(|(k, e)| match e {
                            remix_server_runtime::deferred::DeferredEntry::Critical(v) => {
                                Some((k.clone(), v.clone()))
                            }
                            remix_server_runtime::deferred::DeferredEntry::Tracked(_) => None,
                        })
                        .collect();
                    ctx.set_loader_data(id, Value::Object(critical));
                }
                Err(Thrown::Response(r)) => match Redirect::from_response(r) {
                    Ok(redirect) => return Ok(QueryResult::Response(redirect.into_response())),
                    Err(r) => {
                        let status = r.status();
                        ctx.status_code = status;
                        ctx.set_error(
                            Self::boundary_for(&matches, idx),
                            ErrorResponse::new(status, Value::Null).into(),
                        );
                    }
                },
                Err(Thrown::ErrorResponse(err)) => {
                    ctx.status_code = err.status;
                    ctx.set_error(Self::boundary_for(&matches, idx), err.into());
                }
                Err(Thrown::Error(e)) => {
                    ctx.status_code = StatusCode::INTERNAL_SERVER_ERROR;
                    ctx.set_error(Self::boundary_for(&matches, idx), e.into());
                }
            }
        }
        Ok(QueryResult::Context(ctx))
    }
}

/// What the renderer saw on one call.
#[derive(Debug, Clone)]
pub struct RenderCall {
    pub status: StatusCode,
    pub handoff: String,
    pub critical_css: Option<String>,
    pub errors: Vec<String>,
}

/// Renders a minimal document embedding the handoff. Fails the first
/// `failures` calls.
#[derive(Default)]
pub struct TestRenderer {
    failures: Mutex<usize>,
    pub calls: Mutex<Vec<RenderCall>>,
}

impl TestRenderer {
    pub fn failing(failures: usize) -> Self {
        Self {
            failures: Mutex::new(failures),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DocumentRenderer for TestRenderer {
    async fn render(
        &self,
        _request: &Request,
        status: StatusCode,
        mut headers: HeaderMap,
        context: &EntryContext,
        _load_context: &LoadContext,
    ) -> anyhow::Result<Response> {
        self.calls.lock().push(RenderCall {
            status,
            handoff: context.server_handoff_string.clone(),
            critical_css: context.critical_css.clone(),
            errors: context
                .static_handler_context
                .errors()
                .map(|e| e.keys().cloned().collect())
                .unwrap_or_default(),
        });
        {
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                anyhow::bail!("render exploded");
            }
        }
        headers.insert(CONTENT_TYPE, "text/html; charset=utf-8".parse()?);
        let html = format!(
            "<!DOCTYPE html><html><body><script>window.__remixContext = {};</script></body></html>",
            context.server_handoff_string
        );
        Ok(http::Response::builder()
            .status(status)
            .body(Body::from(html))
            .map(|mut r| {
                *r.headers_mut() = headers;
                r
            })?)
    }
}

/// Route tree used by the dispatcher tests.
pub fn routes() -> Vec<ServerRoute> {
    vec![
        ServerRoute::new(
            "root",
            RouteModule::new().with_component().with_error_boundary(),
        )
        .with_path(""),
        ServerRoute::new(
            "routes/_index",
            RouteModule::new()
                .with_component()
                .with_loader(loader(|_| async { Ok(json!({"message": "hello"}).into()) })),
        )
        .with_parent("root")
        .index(),
        ServerRoute::new(
            "routes/foo",
            RouteModule::new()
                .with_component()
                .with_loader(loader(|_| async { Err(redirect(302, "/bar").into()) })),
        )
        .with_parent("root")
        .with_path("foo"),
        ServerRoute::new(
            "routes/login",
            RouteModule::new().with_component().with_loader(loader(|_| async {
                let mut r = redirect(302, "/");
                r.headers_mut()
                    .insert(SET_COOKIE, "session=abc; Path=/".parse().unwrap());
                Ok(RouteOutcome::from_response(r))
            })),
        )
        .with_parent("root")
        .with_path("login"),
        ServerRoute::new(
            "routes/boom",
            RouteModule::new()
                .with_component()
                .with_loader(loader(|_| async { Err(anyhow::anyhow!("database on fire").into()) })),
        )
        .with_parent("root")
        .with_path("boom"),
        ServerRoute::new(
            "routes/gone",
            RouteModule::new().with_component().with_loader(loader(|_| async {
                Err(ErrorResponse::new(StatusCode::NOT_FOUND, json!("gone")).into())
            })),
        )
        .with_parent("root")
        .with_path("gone"),
        ServerRoute::new(
            "routes/private",
            RouteModule::new().with_component().with_loader(loader(|_| async {
                Err(http::Response::builder()
                    .status(401)
                    .body(Body::from("nope"))
                    .unwrap()
                    .into())
            })),
        )
        .with_parent("root")
        .with_path("private"),
        ServerRoute::new(
            "routes/users.$id",
            RouteModule::new().with_component().with_loader(loader(|args| async move {
                Ok(json!({"id": args.param("id")}).into())
            })),
        )
        .with_parent("root")
        .with_path("users/:id"),
        ServerRoute::new(
            "routes/deferred",
            RouteModule::new().with_component().with_loader(loader(|_| async {
                Ok(DeferredData::new()
                    .with_value("critical", json!(1))
                    .with_deferred("lazy", async { Ok(json!("later")) })
                    .into())
            })),
        )
        .with_parent("root")
        .with_path("deferred"),
        ServerRoute::new(
            "routes/api",
            RouteModule::new()
                .with_loader(loader(|_| async {
                    Ok(http::Response::builder()
                        .status(200)
                        .header(CONTENT_TYPE, "application/json")
                        .body(Body::from(r#"{"ok":true}"#))
                        .unwrap()
                        .into())
                }))
                .with_action(loader(|_| async { Err(anyhow::anyhow!("write failed").into()) })),
        )
        .with_parent("root")
        .with_path("api"),
        ServerRoute::new(
            "routes/api.value",
            RouteModule::new().with_loader(loader(|_| async { Ok(json!({"raw": true}).into()) })),
        )
        .with_parent("root")
        .with_path("api/value"),
        ServerRoute::new(
            "routes/api.redirect",
            RouteModule::new().with_loader(loader(|_| async {
                Ok(RouteOutcome::from_response(redirect(301, "/api")))
            })),
        )
        .with_parent("root")
        .with_path("api/redirect"),
        ServerRoute::new(
            "routes/api.private",
            RouteModule::new().with_loader(loader(|_| async {
                Err(http::Response::builder()
                    .status(403)
                    .body(Body::Empty)
                    .unwrap()
                    .into())
            })),
        )
        .with_parent("root")
        .with_path("api/private"),
    ]
}

/// Records every reported error as its display string.
pub fn recording_error_handler() -> (ErrorHandler, Arc<Mutex<Vec<String>>>) {
    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reported);
    let handler: ErrorHandler = Arc::new(move |err: &RouteError, _args: &HookArgs<'_>| {
        sink.lock().push(err.to_string());
    });
    (handler, reported)
}

pub fn build(renderer: Arc<TestRenderer>, handle_error: Option<ErrorHandler>) -> ServerBuild {
    let mut entry = EntryModule::new(renderer);
    entry.handle_error = handle_error;
    ServerBuild {
        routes: routes(),
        assets: Arc::new(AssetsManifest {
            version: "test".to_string(),
            ..AssetsManifest::default()
        }),
        entry,
        future: Default::default(),
        static_handler: Arc::new(|routes: &RouteTable| {
            Arc::new(FakeStaticHandler::new(routes)) as Arc<dyn StaticHandler>
        }),
    }
}

/// A handler over [`routes`] with recording collaborators.
pub struct TestApp {
    pub handler: RequestHandler,
    pub renderer: Arc<TestRenderer>,
    pub reported: Arc<Mutex<Vec<String>>>,
}

impl TestApp {
    pub fn new(mode: ServerMode) -> Self {
        Self::with_renderer(mode, TestRenderer::default())
    }

    pub fn with_renderer(mode: ServerMode, renderer: TestRenderer) -> Self {
        let renderer = Arc::new(renderer);
        let (error_handler, reported) = recording_error_handler();
        let handler = RequestHandler::new(
            build(Arc::clone(&renderer), Some(error_handler)),
            mode,
        );
        Self {
            handler,
            renderer,
            reported,
        }
    }

    pub async fn handle(&self, request: Request) -> Response {
        self.handler.handle(request, &LoadContext::new()).await
    }

    pub fn reported(&self) -> Vec<String> {
        self.reported.lock().clone()
    }
}
