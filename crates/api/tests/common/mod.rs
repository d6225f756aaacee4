#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use emisafe_core::store::InMemoryStore;
use emisafe_session::{ConnectionHandle, Outbound, SessionOrchestrator};
use http_body_util::BodyExt;
use tokio::sync::mpsc;
use tower::ServiceExt;

use emisafe_api::config::ServerConfig;
use emisafe_api::router::build_app_router;
use emisafe_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults and no database.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["*".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        heartbeat_interval_secs: 30,
        outbound_buffer: 64,
        database_url: None,
        log_json: false,
    }
}

/// The application router plus handles on the state behind it.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub orchestrator: Arc<SessionOrchestrator>,
}

/// Build the full application router over a fresh demo-fleet store, with
/// the same middleware stack production uses.
pub fn build_test_app() -> TestApp {
    let store = Arc::new(InMemoryStore::with_demo_fleet());
    let orchestrator = Arc::new(SessionOrchestrator::new(store.clone(), store.clone()));
    let state = AppState::new(test_config(), Arc::clone(&orchestrator));
    TestApp {
        router: build_app_router(state),
        store,
        orchestrator,
    }
}

/// Register `device_id` on a channel-backed connection, as a socket would.
pub async fn connect_device(
    app: &TestApp,
    device_id: &str,
    customer_id: i64,
) -> (ConnectionHandle, mpsc::Receiver<Outbound>) {
    let (handle, mut rx) = ConnectionHandle::channel(64);
    let frame = serde_json::json!({
        "event": "register_device",
        "data": { "deviceId": device_id, "customerId": customer_id },
    });
    app.orchestrator
        .handle_frame(&handle, &frame.to_string())
        .await;
    // Discard the registration reply.
    let _ = rx.try_recv();
    (handle, rx)
}

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST a raw JSON-typed body, valid or not.
pub async fn post_raw(app: Router, uri: &str, body: &'static str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_empty(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
