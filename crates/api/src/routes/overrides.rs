use axum::routing::post;
use axum::Router;

use crate::handlers::overrides;
use crate::state::AppState;

/// Administrative override routes mounted at `/overrides`.
///
/// ```text
/// POST /{customer_id}/emergency-unlock   -> emergency_unlock
/// POST /{customer_id}/payment            -> record_payment
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/{customer_id}/emergency-unlock",
            post(overrides::emergency_unlock),
        )
        .route("/{customer_id}/payment", post(overrides::record_payment))
}
