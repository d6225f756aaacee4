use axum::extract::State;
use axum::Json;
use emisafe_core::customer::DashboardStats;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/dashboard/stats
pub async fn stats(State(state): State<AppState>) -> AppResult<Json<DataResponse<DashboardStats>>> {
    let stats = state.orchestrator.dispatcher().dashboard_stats().await?;
    Ok(Json(DataResponse { data: stats }))
}
