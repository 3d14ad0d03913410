//! # Router Module
//!
//! Resolves a URL path to the hierarchy of routes that renders it.
//!
//! A build ships a flat route manifest where each route names its parent.
//! [`RouteTable::new`] links that manifest into a tree and flattens it into
//! branches, one per route that can match on its own (routes with a path and
//! index routes). Branches are ranked by specificity:
//!
//! - static segments beat dynamic (`:id`) segments
//! - a trailing splat (`*`) is penalised
//! - index routes beat the layout they belong to
//! - ties keep manifest order among siblings
//!
//! [`RouteTable::match_routes`] walks the ranked branches and returns the
//! first hierarchy whose compiled pattern matches, root first.
//!
//! ## Example
//!
//! ```rust
//! use remix_server_runtime::router::{RouteModule, RouteTable, ServerRoute};
//!
//! let table = RouteTable::new(vec![
//!     ServerRoute::new("root", RouteModule::new().with_component()).with_path(""),
//!     ServerRoute::new("routes/users.$id", RouteModule::new().with_component())
//!         .with_parent("root")
//!         .with_path("users/:id"),
//! ])
//! .unwrap();
//!
//! let matches = table.match_routes("/users/42").unwrap();
//! assert_eq!(matches.len(), 2);
//! assert_eq!(matches[1].get_param("id"), Some("42"));
//! ```

mod core;
mod route;

pub use core::{ParamVec, RouteMatch, RouteTable, RouteTableError, MAX_INLINE_PARAMS, SPLAT_PARAM};
pub use route::{DataFunction, DataFunctionArgs, RouteModule, ServerRoute};
