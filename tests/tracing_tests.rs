mod common;
mod tracing_util;

use common::{get, TestRenderer};
use remix_server_runtime::build::HookArgs;
use remix_server_runtime::dispatcher::default_error_handler;
use remix_server_runtime::errors::{ErrorResponse, RouteError, ServerError};
use remix_server_runtime::router::ParamVec;
use remix_server_runtime::{LoadContext, RequestHandler, ServerMode};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_util::TestTracing;

fn report(mode: ServerMode, err: &RouteError, request: &remix_server_runtime::Request) {
    let handler = default_error_handler(mode);
    let context = LoadContext::new();
    let params = ParamVec::new();
    handler(
        err,
        &HookArgs {
            context: &context,
            params: &params,
            request,
        },
    );
}

#[test]
fn test_default_error_handler_logs_in_production() {
    let tracing = TestTracing::init();
    let err = RouteError::Error(ServerError::new("disk full"));
    report(ServerMode::Production, &err, &get("/"));

    assert!(tracing.contains("Unhandled error"));
    assert!(tracing.contains("disk full"));
}

#[test]
fn test_default_error_handler_logs_internal_cause() {
    let tracing = TestTracing::init();
    let err = RouteError::Response(ErrorResponse::internal(
        http::StatusCode::METHOD_NOT_ALLOWED,
        ServerError::new("no action for route"),
    ));
    report(ServerMode::Development, &err, &get("/"));

    assert!(tracing.contains("no action for route"));
}

#[test]
fn test_default_error_handler_is_silent_in_test_mode() {
    let tracing = TestTracing::init();
    let err = RouteError::Error(ServerError::new("disk full"));
    report(ServerMode::Test, &err, &get("/"));

    assert!(!tracing.contains("Unhandled error"));
}

#[test]
fn test_default_error_handler_skips_cancelled_requests() {
    let tracing = TestTracing::init();
    let signal = CancellationToken::new();
    signal.cancel();
    let mut request = get("/");
    request.extensions_mut().insert(signal);

    let err = RouteError::Error(ServerError::new("client went away"));
    report(ServerMode::Production, &err, &request);

    assert!(!tracing.contains("Unhandled error"));
}

#[tokio::test]
async fn test_request_span_wraps_dispatch() {
    let tracing = TestTracing::init();
    let handler = RequestHandler::new(
        common::build(Arc::new(TestRenderer::default()), None),
        ServerMode::Production,
    );

    let mut request = get("/users/9?_data=routes/users.$id");
    let request_id = ulid::Ulid::new().to_string();
    request
        .headers_mut()
        .insert("x-request-id", request_id.parse().unwrap());
    let response = handler.handle(request, &LoadContext::new()).await;
    assert_eq!(response.status(), http::StatusCode::OK);

    let output = tracing.output();
    assert!(output.contains("remix_request"));
    assert!(output.contains(&format!("request_id={request_id}")));
    assert!(output.contains("Request classified"));
    assert!(output.contains("Request handled"));
    assert!(output.contains("mode=\"data\""));
}

#[tokio::test]
async fn test_failing_build_is_logged() {
    let tracing = TestTracing::init();
    let source = remix_server_runtime::BuildSource::dynamic(|| async {
        Err(anyhow::anyhow!("manifest missing"))
    });
    let handler = RequestHandler::new(source, ServerMode::Production);

    let response = handler.handle(get("/"), &LoadContext::new()).await;
    assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    assert!(tracing.contains("Failed to derive request handler state"));
    assert!(tracing.contains("manifest missing"));
}
