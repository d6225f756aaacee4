use axum::routing::{get, post};
use axum::Router;

use crate::handlers::device_control;
use crate::state::AppState;

/// Routes mounted at `/device-control`.
///
/// ```text
/// POST /command                   -> issue_command
/// GET  /commands/{customer_id}    -> command_history
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/command", post(device_control::issue_command))
        .route(
            "/commands/{customer_id}",
            get(device_control::command_history),
        )
}
