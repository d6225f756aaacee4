use axum::routing::get;
use axum::Router;

use crate::handlers::customers;
use crate::state::AppState;

/// Routes mounted at `/customers`.
///
/// ```text
/// GET  /          -> list
/// GET  /overdue   -> list_overdue
/// GET  /{id}      -> get_by_id
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(customers::list))
        .route("/overdue", get(customers::list_overdue))
        .route("/{id}", get(customers::get_by_id))
}
