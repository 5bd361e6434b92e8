//! REST adapter tests
//!
//! Run with: cargo test --test http_tests

mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{dispatcher, gus_record, StubRegistry};

fn app(stub: Arc<StubRegistry>) -> Router {
    regon_mcp::http::router(Arc::new(dispatcher(stub)))
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_root_lists_endpoints() {
    let router = app(Arc::new(StubRegistry::new()));
    let (status, body) = send(&router, get("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "regon-mcp");
    assert_eq!(body["mode"], "test");
    assert_eq!(body["tools"], 13);
    assert!(body["endpoints"]["search_nip"].is_string());
}

#[tokio::test]
async fn test_health() {
    let router = app(Arc::new(StubRegistry::new()));
    let (status, body) = send(&router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["initialized"], true);
    assert_eq!(body["checks"]["tool_config"]["status"], "healthy");
    assert_eq!(body["checks"]["regon_api"]["status"], "healthy");
    assert_eq!(body["checks"]["regon_api"]["result"]["service_status"], 1);
}

#[tokio::test]
async fn test_health_degraded_when_registry_rejects_session() {
    let stub = Arc::new(StubRegistry {
        reject_auth: true,
        ..StubRegistry::new()
    });
    let dispatcher = Arc::new(dispatcher(stub));
    assert!(dispatcher.ensure_initialized().await.is_err());
    let router = regon_mcp::http::router(dispatcher);

    let (status, body) = send(&router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["initialized"], false);
    assert_eq!(body["checks"]["regon_api"]["status"], "unhealthy");
    assert!(body["checks"]["regon_api"]["error"]
        .as_str()
        .unwrap()
        .contains("invalid key"));
}

#[tokio::test]
async fn test_list_tools() {
    let router = app(Arc::new(StubRegistry::new()));
    let (status, body) = send(&router, get("/tools")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 13);
    assert_eq!(body["catalog"]["source"], "built_in");
    assert!(body["tools"][0]["inputSchema"].is_object());
}

#[tokio::test]
async fn test_call_tool() {
    let router = app(Arc::new(StubRegistry::with_records(vec![gus_record()])));
    let (status, body) = send(
        &router,
        post_json(
            "/tools/call",
            r#"{"name":"regon_search_by_nip","arguments":{"nip":"7342867148"}}"#,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tool"], "regon_search_by_nip");
    assert_eq!(body["is_error"], false);
    assert!(body.get("error_code").is_none());
    assert!(body["request_id"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(body["result"].as_str().unwrap().contains("5261040828"));
}

#[tokio::test]
async fn test_call_tool_validation_error_is_400() {
    let stub = Arc::new(StubRegistry::new());
    let router = app(stub.clone());
    let (status, body) = send(
        &router,
        post_json(
            "/tools/call",
            r#"{"name":"regon_search_by_nip","arguments":{"nip":"123"}}"#,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["is_error"], true);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
    assert_eq!(stub.total_calls(), 0);
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let router = app(Arc::new(StubRegistry::new()));
    let (status, body) = send(&router, post_json("/tools/call", "{not json")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
    assert!(body["result"]
        .as_str()
        .unwrap()
        .contains("Invalid request body"));
}

#[tokio::test]
async fn test_upstream_failure_maps_to_502() {
    let stub = Arc::new(StubRegistry {
        reject_auth: true,
        ..StubRegistry::new()
    });
    let router = app(stub);
    let (status, body) = send(
        &router,
        post_json("/tools/call", r#"{"name":"regon_get_service_status"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error_code"], "API_ERROR");
}

#[tokio::test]
async fn test_search_by_path() {
    let router = app(Arc::new(StubRegistry::with_records(vec![gus_record()])));
    let (status, body) = send(&router, get("/search/nip/7342867148")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "NIP");
    assert_eq!(body["query"], "7342867148");
    assert_eq!(body["tool"], "regon_search_by_nip");
    assert_eq!(body["data"], json!([gus_record()]));
}

#[tokio::test]
async fn test_search_invalid_identifier() {
    let router = app(Arc::new(StubRegistry::new()));
    let (status, body) = send(&router, get("/search/regon/12345")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_search_unknown_kind_is_404() {
    let router = app(Arc::new(StubRegistry::new()));
    let (status, body) = send(&router, get("/search/pesel/12345678901")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["is_error"], true);
}
