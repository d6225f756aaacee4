//! Administrative overrides that act on a device outside the command
//! lifecycle.

use axum::extract::{Path, State};
use axum::Json;
use emisafe_core::customer::Customer;
use emisafe_core::presence::DeviceStatus;
use emisafe_core::types::DbId;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::extract::AppJson;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyUnlockResponse {
    pub customer_id: DbId,
    pub device_id: String,
    pub device_status: DeviceStatus,
    pub device_notified: bool,
}

/// Body of `POST /overrides/{customer_id}/payment`. An absent amount pays
/// one EMI.
#[derive(Debug, Default, Deserialize)]
pub struct PaymentRequest {
    #[serde(default)]
    pub amount: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub amount: i64,
    pub remaining_overdue: i64,
    pub device_notified: bool,
    pub customer: Customer,
}

/// POST /api/v1/overrides/{customer_id}/emergency-unlock
pub async fn emergency_unlock(
    State(state): State<AppState>,
    Path(customer_id): Path<DbId>,
) -> AppResult<Json<DataResponse<EmergencyUnlockResponse>>> {
    let outcome = state.orchestrator.emergency_unlock(customer_id).await?;
    Ok(Json(DataResponse {
        data: EmergencyUnlockResponse {
            customer_id: outcome.customer_id,
            device_id: outcome.device_id,
            device_status: outcome.status,
            device_notified: outcome.device_notified,
        },
    }))
}

/// POST /api/v1/overrides/{customer_id}/payment
pub async fn record_payment(
    State(state): State<AppState>,
    Path(customer_id): Path<DbId>,
    AppJson(input): AppJson<PaymentRequest>,
) -> AppResult<Json<DataResponse<PaymentResponse>>> {
    let outcome = state
        .orchestrator
        .record_payment(customer_id, input.amount)
        .await?;
    Ok(Json(DataResponse {
        data: PaymentResponse {
            amount: outcome.receipt.amount,
            remaining_overdue: outcome.receipt.remaining_overdue,
            device_notified: outcome.device_notified,
            customer: outcome.receipt.customer,
        },
    }))
}
