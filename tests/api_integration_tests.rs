//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle through the router: agent endpoints,
//! cache service routes and the caching proxy fallback.

mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use storefront_cache::api::create_router;
use storefront_cache::clock::ManualClock;
use storefront_cache::storage::{FileStorage, SharedStore};
use storefront_cache::{spawn_control_channel, AppState, CacheAgent, CacheService};
use tower::ServiceExt;

use common::{test_config, ScriptedFetcher};

// == Helper Functions ==

async fn create_test_app(network: Arc<ScriptedFetcher>, storage: Option<SharedStore>) -> Router {
    let config = test_config(&[]);
    let clock = Arc::new(ManualClock::new(0));
    let agent = Arc::new(CacheAgent::new(&config, network, clock.clone()).unwrap());
    agent.install().await.unwrap();

    let service = Arc::new(CacheService::from_config(&config, clock, storage));
    let (control, _task) = spawn_control_channel(agent.clone(), 8);
    create_router(AppState::new(agent, service, control))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn message(json: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/__agent/message")
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn put_value(key: &str, json: &str) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(format!("/__agent/store/{}", key))
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

// == Health ==

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app(ScriptedFetcher::new(), None).await;

    let response = app.oneshot(get("/__agent/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["state"], "active");
    assert_eq!(json["partitions"]["api-v1"], 0);
}

// == Proxy ==

#[tokio::test]
async fn test_proxy_caches_api_responses() {
    let network = ScriptedFetcher::new();
    network.respond("/api/product/all?page=2", 200, r#"[{"id":7}]"#);
    let app = create_test_app(network.clone(), None).await;

    let first = app.clone().oneshot(get("/api/product/all?page=2")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-cache"], "MISS");

    let second = app.oneshot(get("/api/product/all?page=2")).await.unwrap();
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(body_to_string(second.into_body()).await, r#"[{"id":7}]"#);
}

#[tokio::test]
async fn test_proxy_offline_api_is_json_503() {
    let network = ScriptedFetcher::new();
    network.set_offline(true);
    let app = create_test_app(network, None).await;

    let response = app.oneshot(get("/api/user/me")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()["content-type"], "application/json");

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "Network unavailable");
}

#[tokio::test]
async fn test_proxy_forwards_post_without_caching() {
    let network = ScriptedFetcher::new();
    network.respond("/api/cart", 200, "ok");
    let app = create_test_app(network.clone(), None).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/cart")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.headers()["x-cache"], "BYPASS");
    assert_eq!(network.calls_for("/api/cart"), 1);
}

// == Control Messages ==

#[tokio::test]
async fn test_get_stats_message() {
    let app = create_test_app(ScriptedFetcher::new(), None).await;

    let response = app.oneshot(message(r#"{"type":"GET_STATS"}"#)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["hits"], 0);
    assert_eq!(json["misses"], 0);
    assert_eq!(json["hitRate"], 0.0);
    assert!(json.get("avgResponseTime").is_some());
}

#[tokio::test]
async fn test_clear_cache_message() {
    let app = create_test_app(ScriptedFetcher::new(), None).await;

    let response = app.oneshot(message(r#"{"type":"CLEAR_CACHE"}"#)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_to_json(response.into_body()).await["success"], true);
}

#[tokio::test]
async fn test_skip_waiting_message_has_no_body() {
    let app = create_test_app(ScriptedFetcher::new(), None).await;

    let response = app.oneshot(message(r#"{"type":"SKIP_WAITING"}"#)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_unknown_message_is_rejected() {
    let app = create_test_app(ScriptedFetcher::new(), None).await;

    let response = app.oneshot(message(r#"{"type":"REBOOT"}"#)).await.unwrap();
    assert!(response.status().is_client_error());
}

// == Cache Service Routes ==

#[tokio::test]
async fn test_store_set_get_delete() {
    let app = create_test_app(ScriptedFetcher::new(), None).await;

    let response = app
        .clone()
        .oneshot(put_value("bestSellers", r#"{"value":[1,2],"ttl":60}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert!(json["message"].as_str().unwrap().contains("bestSellers"));

    let response = app.clone().oneshot(get("/__agent/store/bestSellers")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["value"], serde_json::json!([1, 2]));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/__agent/store/bestSellers")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/__agent/store/bestSellers")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_store_get_not_found() {
    let app = create_test_app(ScriptedFetcher::new(), None).await;

    let response = app.oneshot(get("/__agent/store/nonexistent")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_to_json(response.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("nonexistent"));
}

#[tokio::test]
async fn test_store_invalid_json() {
    let app = create_test_app(ScriptedFetcher::new(), None).await;

    let response = app.oneshot(put_value("products", "not json")).await.unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_persisted_values_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let storage: SharedStore = Arc::new(FileStorage::open(dir.path()).unwrap());

    let app = create_test_app(ScriptedFetcher::new(), Some(storage.clone())).await;
    let response = app
        .oneshot(put_value("userProfile", r#"{"value":{"name":"Ada"}}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // A fresh process over the same directory
    let storage: SharedStore = Arc::new(FileStorage::open(dir.path()).unwrap());
    let restarted = CacheService::from_config(
        &test_config(&[]),
        Arc::new(ManualClock::new(1_000)),
        Some(storage),
    );
    assert_eq!(restarted.hydrate(), 1);
    assert_eq!(
        restarted.get_value("userProfile"),
        Some(serde_json::json!({"name": "Ada"}))
    );
}
