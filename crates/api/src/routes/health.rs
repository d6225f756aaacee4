use axum::extract::State;
use axum::{routing::get, Json, Router};
use emisafe_core::store::DeviceStore;
use emisafe_session::Role;
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the customer/device store is reachable.
    pub store_healthy: bool,
    /// Devices with a live registered connection.
    pub connected_devices: usize,
}

/// GET /health -- returns service and store health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_healthy = state.devices.health_check().await.is_ok();
    let connected_devices = state.orchestrator.registry().count(Role::Device).await;

    let status = if store_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        store_healthy,
        connected_devices,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
