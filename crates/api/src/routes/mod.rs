pub mod customers;
pub mod dashboard;
pub mod device_control;
pub mod health;
pub mod overrides;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                                         WebSocket (devices and operators)
///
/// /customers                                  customer snapshot (GET)
/// /customers/overdue                          customers with overdue EMIs (GET)
/// /customers/{id}                             one customer with loan (GET)
///
/// /device-control/command                     issue a command (POST)
/// /device-control/commands/{customer_id}      command history (GET, ?limit=)
///
/// /dashboard/stats                            aggregate counters (GET)
///
/// /overrides/{customer_id}/emergency-unlock   unlock outside the command flow (POST)
/// /overrides/{customer_id}/payment            record a payment (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/customers", customers::router())
        .nest("/device-control", device_control::router())
        .nest("/dashboard", dashboard::router())
        .nest("/overrides", overrides::router())
}
