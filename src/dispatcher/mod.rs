//! # Dispatcher Module
//!
//! Turns one request into one response.
//!
//! ## Request Flow
//!
//! 1. Resolve the current [`Derivation`] (route table, loader subsystem,
//!    error handler). Static builds derive once; dynamic builds re-derive on
//!    every call.
//! 2. Match the URL path against the route table.
//! 3. [`classify_request`] picks data, resource or document mode.
//! 4. The mode handler calls the loader subsystem and converts the outcome.
//! 5. `HEAD` responses lose their body.
//!
//! ## Error Handling
//!
//! Nothing escapes [`RequestHandler::handle`]:
//!
//! | Outcome | Data mode | Resource mode | Document mode |
//! |---|---|---|---|
//! | thrown response | `X-Remix-Catch` | `X-Remix-Catch` | rendered by the loader subsystem |
//! | typed error response | JSON + `X-Remix-Error` | JSON + `X-Remix-Error` | boundary render |
//! | unexpected error | 500 JSON + `X-Remix-Error` | plain-text 500 | boundary render, then plain-text 500 |
//!
//! Reportable errors go to the build's error handler, or to
//! [`default_error_handler`], which logs unless the mode is `test` or the
//! request was already cancelled.

mod core;
mod modes;

pub use core::{
    classify_request, data_route_id, default_error_handler, derive, strip_body_for_head,
    Derivation, DispatchError, HandleOptions, RequestHandler, RequestMode,
};
