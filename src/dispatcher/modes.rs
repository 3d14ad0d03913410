//! Per-mode request handlers.

use crate::body::{Body, Request, Response};
use crate::build::FutureConfig;
use crate::data::{request_signal, LoadContext, QueryResult, ResultContext, RouteOutcome, Thrown};
use crate::deferred::create_deferred_stream;
use crate::entry::EntryContext;
use crate::errors::{serialize_error, serialize_errors, ErrorResponse, RouteError, ServerError};
use crate::handoff::{create_server_handoff_string, HandoffState, ServerHandoff};
use crate::headers::document_headers;
use crate::mode::ServerMode;
use crate::responses::{
    build_response, json_response, last_resort_error_response, mark, Redirect, StatusText,
    CONTENT_TYPE_DEFERRED, X_REMIX_CATCH, X_REMIX_ERROR, X_REMIX_RESPONSE, YES,
};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::core::{Derivation, DispatchError, ErrorReporter};

/// JSON error body for a typed error response, keeping its status.
fn error_response_to_json(err: &ErrorResponse, mode: ServerMode) -> Response {
    let cause = err.error.clone().unwrap_or_else(ServerError::unexpected);
    let mut headers = HeaderMap::new();
    headers.insert(X_REMIX_ERROR, YES);
    let mut response = json_response(&serialize_error(&cause, mode), err.status, headers);
    if err.status.canonical_reason() != Some(err.status_text.as_str()) {
        response
            .extensions_mut()
            .insert(StatusText(err.status_text.clone()));
    }
    response
}

/// Report `err` if it is worth hearing about and turn it into a JSON body.
fn reported_error_response(err: ErrorResponse, mode: ServerMode, reporter: &ErrorReporter<'_>) -> Response {
    let response = error_response_to_json(&err, mode);
    let err = RouteError::Response(err);
    if err.is_reportable() {
        reporter.report(&err);
    }
    response
}

fn caught(mut response: Response) -> Response {
    mark(&mut response, X_REMIX_CATCH);
    response
}

/// Resolve one route's data for client-side navigation.
pub(crate) async fn handle_data_request(
    derived: &Derivation,
    route_id: &str,
    request: &Request,
    load_context: &LoadContext,
    reporter: &ErrorReporter<'_>,
) -> Response {
    let mode = derived.mode;
    let outcome = derived
        .static_handler
        .query_route(request, route_id, load_context)
        .await;

    match outcome {
        Ok(RouteOutcome::Redirect(redirect)) => {
            debug!(route_id = %route_id, location = %redirect.location, status = redirect.status.as_u16(), "Data request redirected");
            redirect.into_data_response()
        }
        Ok(RouteOutcome::Deferred(data)) => {
            let (status, mut headers, entries) = data.into_parts();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_DEFERRED));
            headers.insert(X_REMIX_RESPONSE, YES);
            debug!(route_id = %route_id, keys = entries.len(), "Streaming deferred data");
            let body = create_deferred_stream(entries, request_signal(request), mode);
            build_response(status, headers, body)
        }
        Ok(RouteOutcome::Response(response)) => match Redirect::from_response(response) {
            Ok(redirect) => redirect.into_data_response(),
            Err(mut response) => {
                mark(&mut response, X_REMIX_RESPONSE);
                response
            }
        },
        Ok(RouteOutcome::Value(value)) => {
            let mut response = json_response(&value, StatusCode::OK, HeaderMap::new());
            mark(&mut response, X_REMIX_RESPONSE);
            response
        }
        // Redirects surface as 204s whether they were returned or thrown.
        Err(Thrown::Response(response)) => match Redirect::from_response(response) {
            Ok(redirect) => redirect.into_data_response(),
            Err(response) => caught(response),
        },
        Err(Thrown::ErrorResponse(err)) => reported_error_response(err, mode, reporter),
        Err(Thrown::Error(e)) => {
            let err = ServerError::from_anyhow(&e);
            warn!(route_id = %route_id, error = %e, "Data request failed");
            reporter.report(&RouteError::Error(err.clone()));
            let mut headers = HeaderMap::new();
            headers.insert(X_REMIX_ERROR, YES);
            json_response(
                &serialize_error(&err, mode),
                StatusCode::INTERNAL_SERVER_ERROR,
                headers,
            )
        }
    }
}

/// Run a resource route's loader or action and return its response as is.
pub(crate) async fn handle_resource_request(
    derived: &Derivation,
    route_id: &str,
    request: &Request,
    load_context: &LoadContext,
    reporter: &ErrorReporter<'_>,
) -> Response {
    let mode = derived.mode;
    let outcome = derived
        .static_handler
        .query_route(request, route_id, load_context)
        .await;

    match outcome {
        Ok(RouteOutcome::Response(response)) => response,
        Ok(RouteOutcome::Redirect(redirect)) => redirect.into_response(),
        Ok(other) => {
            let err = DispatchError::NotAResponse(other.kind());
            error!(route_id = %route_id, error = %err, "Resource route invariant violated");
            reporter.report(&err.to_route_error());
            last_resort_error_response(&err, mode)
        }
        Err(Thrown::Response(response)) => caught(response),
        Err(Thrown::ErrorResponse(err)) => reported_error_response(err, mode, reporter),
        Err(Thrown::Error(e)) => {
            let err = ServerError::from_anyhow(&e);
            warn!(route_id = %route_id, error = %e, "Resource request failed");
            reporter.report(&RouteError::Error(err.clone()));
            last_resort_error_response(&err, mode)
        }
    }
}

fn handoff_string(
    context: &ResultContext,
    critical_css: Option<&str>,
    future: &FutureConfig,
    mode: ServerMode,
) -> String {
    create_server_handoff_string(&ServerHandoff {
        url: &context.location,
        critical_css,
        state: HandoffState {
            loader_data: context.loader_data(),
            action_data: context.action_data.as_ref(),
            errors: serialize_errors(context.errors(), mode),
        },
        future,
    })
}

/// Resolve the whole matched tree and render the document, retrying once at
/// an error boundary when rendering fails.
pub(crate) async fn handle_document_request(
    derived: &Derivation,
    request: &Request,
    load_context: &LoadContext,
    reporter: &ErrorReporter<'_>,
    critical_css: Option<&str>,
) -> Response {
    let mode = derived.mode;
    let build = &derived.build;

    let mut context = match derived.static_handler.query(request, load_context).await {
        Ok(QueryResult::Context(context)) => context,
        Ok(QueryResult::Response(response)) => {
            debug!(status = response.status().as_u16(), "Document query short-circuited");
            return response;
        }
        Err(e) => {
            warn!(error = %e, "Document query failed");
            reporter.report(&RouteError::from(e));
            return build_response(StatusCode::INTERNAL_SERVER_ERROR, HeaderMap::new(), Body::Empty);
        }
    };

    if let Some(errors) = context.errors() {
        for err in errors.values().filter(|err| err.is_reportable()) {
            reporter.report(err);
        }
    }
    context.sanitize_errors(mode);

    let headers = document_headers(&context);
    let entry = EntryContext {
        manifest: Arc::clone(&build.assets),
        route_modules: Arc::clone(&derived.route_modules),
        server_handoff_string: handoff_string(&context, critical_css, &build.future, mode),
        static_handler_context: context,
        critical_css: critical_css.map(str::to_owned),
        future: build.future.clone(),
        mode,
    };

    let render = &build.entry.render;
    let status = entry.static_handler_context.status_code;
    let first_error = match render
        .render(request, status, headers.clone(), &entry, load_context)
        .await
    {
        Ok(response) => return response,
        Err(e) => e,
    };

    warn!(error = %first_error, "Document render failed, retrying at error boundary");
    let first_error = RouteError::from(first_error);
    reporter.report(&first_error);

    let mut context = derived
        .static_handler
        .context_from_error(&entry.static_handler_context, first_error);
    context.sanitize_errors(mode);

    // The retry handoff carries no critical CSS.
    let entry = EntryContext {
        server_handoff_string: handoff_string(&context, None, &build.future, mode),
        static_handler_context: context,
        ..entry
    };

    let status = entry.static_handler_context.status_code;
    match render
        .render(request, status, headers, &entry, load_context)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            let err = ServerError::from_anyhow(&e);
            error!(error = %err, "Document render failed twice");
            reporter.report(&RouteError::Error(err.clone()));
            last_resort_error_response(&err, mode)
        }
    }
}
