//! # Server Build
//!
//! A build bundles what the compiler produced for one version of the app:
//! the route manifest, the client asset manifest, and the server entry
//! module with its render function and optional hooks.
//!
//! The request handler accepts either a fixed build or a function that
//! produces the current build (used while developing, when the route tree
//! may change between requests). See [`BuildSource`].

use crate::body::{Request, Response};
use crate::data::{LoadContext, StaticHandler};
use crate::entry::EntryContext;
use crate::errors::RouteError;
use crate::router::{ParamVec, RouteTable, ServerRoute};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Opt-in feature flags, forwarded to the client.
pub type FutureConfig = BTreeMap<String, bool>;

/// Client entry point assets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryAssets {
    pub module: String,
    #[serde(default)]
    pub imports: Vec<String>,
}

/// Client asset manifest produced by the compiler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetsManifest {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub entry: EntryAssets,
    /// Per-route client assets keyed by route id.
    #[serde(default)]
    pub routes: BTreeMap<String, Value>,
}

/// Context handed to the error and data-request hooks.
#[derive(Debug, Clone, Copy)]
pub struct HookArgs<'a> {
    pub context: &'a LoadContext,
    pub params: &'a ParamVec,
    pub request: &'a Request,
}

/// Receives every reportable error. Never influences the response.
pub type ErrorHandler = Arc<dyn Fn(&RouteError, &HookArgs<'_>) + Send + Sync>;

/// Renders the HTML document for a resolved context.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(
        &self,
        request: &Request,
        status: StatusCode,
        headers: HeaderMap,
        context: &EntryContext,
        load_context: &LoadContext,
    ) -> anyhow::Result<Response>;
}

/// Post-processes every data-mode response.
#[async_trait]
pub trait DataRequestHook: Send + Sync {
    async fn handle_data_request(
        &self,
        response: Response,
        args: HookArgs<'_>,
    ) -> anyhow::Result<Response>;
}

/// Builds the loader subsystem over a build's route table.
pub type StaticHandlerFactory = Arc<dyn Fn(&RouteTable) -> Arc<dyn StaticHandler> + Send + Sync>;

/// The server entry module.
#[derive(Clone)]
pub struct EntryModule {
    pub render: Arc<dyn DocumentRenderer>,
    pub handle_error: Option<ErrorHandler>,
    pub handle_data_request: Option<Arc<dyn DataRequestHook>>,
}

impl EntryModule {
    #[must_use]
    pub fn new(render: Arc<dyn DocumentRenderer>) -> Self {
        Self {
            render,
            handle_error: None,
            handle_data_request: None,
        }
    }

    #[must_use]
    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.handle_error = Some(handler);
        self
    }

    #[must_use]
    pub fn with_data_request_hook(mut self, hook: Arc<dyn DataRequestHook>) -> Self {
        self.handle_data_request = Some(hook);
        self
    }
}

impl fmt::Debug for EntryModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryModule")
            .field("handle_error", &self.handle_error.is_some())
            .field("handle_data_request", &self.handle_data_request.is_some())
            .finish_non_exhaustive()
    }
}

/// One compiled version of the app.
#[derive(Clone)]
pub struct ServerBuild {
    pub routes: Vec<ServerRoute>,
    pub assets: Arc<AssetsManifest>,
    pub entry: EntryModule,
    pub future: FutureConfig,
    pub static_handler: StaticHandlerFactory,
}

impl fmt::Debug for ServerBuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuild")
            .field("routes", &self.routes.len())
            .field("assets_version", &self.assets.version)
            .field("entry", &self.entry)
            .field("future", &self.future)
            .finish_non_exhaustive()
    }
}

pub type BuildFuture = BoxFuture<'static, anyhow::Result<Arc<ServerBuild>>>;
pub type BuildFn = Arc<dyn Fn() -> BuildFuture + Send + Sync>;

/// Where the request handler gets its build from.
#[derive(Clone)]
pub enum BuildSource {
    /// Derived once, on first use.
    Static(Arc<ServerBuild>),
    /// Fetched and re-derived on every request.
    Dynamic(BuildFn),
}

impl BuildSource {
    pub fn dynamic<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Arc<ServerBuild>>> + Send + 'static,
    {
        BuildSource::Dynamic(Arc::new(move || f().boxed()))
    }

    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        matches!(self, BuildSource::Dynamic(_))
    }

    /// Resolve the build for one request.
    pub async fn load(&self) -> anyhow::Result<Arc<ServerBuild>> {
        match self {
            BuildSource::Static(build) => Ok(Arc::clone(build)),
            BuildSource::Dynamic(f) => f().await,
        }
    }
}

impl From<ServerBuild> for BuildSource {
    fn from(build: ServerBuild) -> Self {
        BuildSource::Static(Arc::new(build))
    }
}

impl From<Arc<ServerBuild>> for BuildSource {
    fn from(build: Arc<ServerBuild>) -> Self {
        BuildSource::Static(build)
    }
}

impl fmt::Debug for BuildSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildSource::Static(build) => f.debug_tuple("Static").field(build).finish(),
            BuildSource::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}
