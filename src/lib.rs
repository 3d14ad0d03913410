//! # remix-server-runtime
//!
//! Server-side request dispatcher for a full-stack web framework. Given an
//! HTTP request and a compiled build (route manifest, asset manifest, entry
//! module), [`RequestHandler`] decides what the request wants, drives the
//! loader subsystem and turns every outcome into an HTTP response.
//!
//! ## Overview
//!
//! Each request is handled in one of three modes:
//!
//! - **Data** (`?_data=<route id>`) - one route's data as JSON or a deferred
//!   stream, for client-side navigation. Redirects become a `204` with
//!   `X-Remix-Redirect`/`X-Remix-Status` headers since `fetch` cannot observe
//!   the redirects it follows.
//! - **Resource** - the leaf route has no UI and no error boundary, so its
//!   loader or action response is returned as is.
//! - **Document** - every matched route is loaded and the entry module's
//!   renderer produces HTML, with one retry at an error boundary when
//!   rendering fails.
//!
//! `HEAD` requests get the response of the equivalent `GET` without a body.
//!
//! ## Architecture
//!
//! - **[`errors`]** - error model, sanitization and serialization
//! - **[`responses`]** - wire-protocol headers and response helpers
//! - **[`deferred`]** - tracked deferred values and the `text/remix-deferred` encoder
//! - **[`router`]** - route manifest to ranked branches, path matching
//! - **[`data`]** - load context, result context and the loader subsystem seam
//! - **[`headers`]**, **[`handoff`]**, **[`entry`]** - document assembly
//! - **[`build`]** - server build, entry module collaborators, static vs dynamic builds
//! - **[`dispatcher`]** - mode classification and per-mode handlers
//!
//! ## Collaborators
//!
//! The crate does not load data or render HTML itself. A build supplies:
//!
//! - a [`StaticHandler`](data::StaticHandler) factory (the loader subsystem),
//! - a [`DocumentRenderer`](build::DocumentRenderer),
//! - optionally an [`ErrorHandler`](build::ErrorHandler) and a
//!   [`DataRequestHook`](build::DataRequestHook).
//!
//! ## Configuration
//!
//! | Variable | Meaning |
//! |---|---|
//! | `REMIX_SERVER_MODE` | `development`, `production` or `test` (falls back to `NODE_ENV`) |
//! | `REMIX_LOG_LEVEL` | log level (default `info`) |
//! | `REMIX_LOG_FORMAT` | `json` or `pretty` |
//! | `REMIX_LOG_TARGET_FILTER` | extra `EnvFilter` directives |
//! | `REMIX_LOG_INCLUDE_LOCATION` | include file/line in log lines |
//! | `REMIX_LOG_ASYNC` | log through a non-blocking writer |
//!
//! ## Example
//!
//! ```rust,ignore
//! use remix_server_runtime::{LoadContext, RequestHandler, ServerMode};
//!
//! let handler = RequestHandler::new(build, ServerMode::Production);
//! let response = handler.handle(request, &LoadContext::new()).await;
//! ```

pub mod body;
pub mod build;
pub mod data;
pub mod deferred;
pub mod dispatcher;
pub mod entry;
pub mod errors;
pub mod handoff;
pub mod headers;
pub mod ids;
pub mod logging;
pub mod mode;
pub mod responses;
pub mod router;
pub mod runtime_config;

pub use body::{Body, Request, Response};
pub use build::{BuildSource, EntryModule, ServerBuild};
pub use data::{LoadContext, QueryResult, ResultContext, RouteOutcome, StaticHandler, Thrown};
pub use deferred::{DeferredData, TrackedValue};
pub use dispatcher::{HandleOptions, RequestHandler, RequestMode};
pub use errors::{ErrorResponse, RouteError, ServerError};
pub use mode::ServerMode;
