use crate::data::{LoadContext, RouteOutcome, Thrown};
use crate::headers::HeadersFn;
use futures_util::future::BoxFuture;
use http::{HeaderMap, Method, Uri};
use std::fmt;
use std::sync::Arc;

use super::core::ParamVec;

/// Arguments the loader subsystem hands to a loader or action.
///
/// Owned so that data functions can return `'static` futures.
#[derive(Clone)]
pub struct DataFunctionArgs {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub params: ParamVec,
    pub context: LoadContext,
}

impl DataFunctionArgs {
    /// Path parameter lookup, last occurrence wins.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A route's loader or action.
pub type DataFunction =
    Arc<dyn Fn(DataFunctionArgs) -> BoxFuture<'static, Result<RouteOutcome, Thrown>> + Send + Sync>;

/// Everything a route module exports that the server cares about.
#[derive(Clone, Default)]
pub struct RouteModule {
    /// The module renders UI (has a default export).
    pub default_export: bool,
    /// The module can render in place of a failed descendant.
    pub error_boundary: bool,
    pub headers: Option<HeadersFn>,
    pub loader: Option<DataFunction>,
    pub action: Option<DataFunction>,
}

impl RouteModule {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_component(mut self) -> Self {
        self.default_export = true;
        self
    }

    #[must_use]
    pub fn with_error_boundary(mut self) -> Self {
        self.error_boundary = true;
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeadersFn) -> Self {
        self.headers = Some(headers);
        self
    }

    #[must_use]
    pub fn with_loader(mut self, loader: DataFunction) -> Self {
        self.loader = Some(loader);
        self
    }

    #[must_use]
    pub fn with_action(mut self, action: DataFunction) -> Self {
        self.action = Some(action);
        self
    }

    /// Neither UI nor an error boundary: the route only serves data.
    #[inline]
    #[must_use]
    pub fn is_resource(&self) -> bool {
        !self.default_export && !self.error_boundary
    }
}

impl fmt::Debug for RouteModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteModule")
            .field("default_export", &self.default_export)
            .field("error_boundary", &self.error_boundary)
            .field("headers", &self.headers.is_some())
            .field("loader", &self.loader.is_some())
            .field("action", &self.action.is_some())
            .finish()
    }
}

/// One entry of the build's route manifest.
#[derive(Debug, Clone)]
pub struct ServerRoute {
    /// Unique, stable across requests (e.g. `routes/users.$id`).
    pub id: String,
    pub parent_id: Option<String>,
    /// Path segment(s) relative to the parent. `None` for pathless layouts
    /// and index routes.
    pub path: Option<String>,
    pub index: bool,
    pub case_sensitive: bool,
    pub module: Arc<RouteModule>,
}

impl ServerRoute {
    #[must_use]
    pub fn new(id: impl Into<String>, module: RouteModule) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            path: None,
            index: false,
            case_sensitive: false,
            module: Arc::new(module),
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    #[must_use]
    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }
}
