//! Render context handed to the document renderer.

use crate::build::{AssetsManifest, FutureConfig};
use crate::data::ResultContext;
use crate::errors::{serialize_error, SerializedError, ServerError};
use crate::mode::ServerMode;
use crate::router::{RouteModule, RouteTable};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Route modules keyed by route id.
pub type EntryRouteModules = BTreeMap<String, Arc<RouteModule>>;

/// Everything the renderer needs to produce a document.
#[derive(Debug, Clone)]
pub struct EntryContext {
    pub manifest: Arc<AssetsManifest>,
    pub route_modules: Arc<EntryRouteModules>,
    /// Result context with errors already sanitized.
    pub static_handler_context: ResultContext,
    pub critical_css: Option<String>,
    /// HTML-safe JSON to inline for client hydration.
    pub server_handoff_string: String,
    pub future: FutureConfig,
    pub(crate) mode: ServerMode,
}

impl EntryContext {
    /// Serialize an error the renderer wants to embed, redacted for the
    /// current mode.
    #[must_use]
    pub fn serialize_error(&self, error: &ServerError) -> SerializedError {
        serialize_error(error, self.mode)
    }

    #[must_use]
    pub fn mode(&self) -> ServerMode {
        self.mode
    }
}

#[must_use]
pub fn create_entry_route_modules(routes: &RouteTable) -> EntryRouteModules {
    routes
        .routes()
        .iter()
        .map(|route| (route.id.clone(), Arc::clone(&route.module)))
        .collect()
}
