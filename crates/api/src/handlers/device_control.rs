//! Handlers for issuing commands and reading command history.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use emisafe_core::command::{CommandType, DeviceCommand};
use emisafe_core::error::CoreError;
use emisafe_core::store::DeviceStore;
use emisafe_core::types::DbId;
use serde::Deserialize;

use crate::error::AppResult;
use crate::extract::AppJson;
use crate::query::HistoryParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /device-control/command`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCommandRequest {
    pub customer_id: DbId,
    pub command: CommandType,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// POST /api/v1/device-control/command
///
/// Responds `201` with the pending command once it has been pushed to the
/// device. A device without a live connection yields `400
/// DEVICE_NOT_CONNECTED` carrying its `deviceStatus`; the failed command is
/// still recorded.
pub async fn issue_command(
    State(state): State<AppState>,
    AppJson(input): AppJson<IssueCommandRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<DeviceCommand>>)> {
    let command = state
        .orchestrator
        .dispatcher()
        .issue_for_customer(input.customer_id, input.command, input.payload)
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: command })))
}

/// GET /api/v1/device-control/commands/{customer_id}?limit=
pub async fn command_history(
    State(state): State<AppState>,
    Path(customer_id): Path<DbId>,
    Query(params): Query<HistoryParams>,
) -> AppResult<Json<DataResponse<Vec<DeviceCommand>>>> {
    let customer = state
        .devices
        .find_customer(customer_id)
        .await?
        .ok_or_else(|| CoreError::not_found("Customer", customer_id))?;
    let commands = state
        .orchestrator
        .dispatcher()
        .list_command_history(&customer.device_id, params.limit)
        .await?;
    Ok(Json(DataResponse { data: commands }))
}
