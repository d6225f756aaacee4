//! Handlers for the `/customers` resource.

use axum::extract::{Path, State};
use axum::Json;
use emisafe_core::customer::Customer;
use emisafe_core::error::CoreError;
use emisafe_core::store::DeviceStore;
use emisafe_core::types::DbId;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/customers
pub async fn list(State(state): State<AppState>) -> AppResult<Json<DataResponse<Vec<Customer>>>> {
    let customers = state.devices.list_customers().await?;
    Ok(Json(DataResponse { data: customers }))
}

/// GET /api/v1/customers/overdue
pub async fn list_overdue(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<Customer>>>> {
    let customers = state
        .devices
        .list_customers()
        .await?
        .into_iter()
        .filter(|c| c.overdue_amount() > 0)
        .collect();
    Ok(Json(DataResponse { data: customers }))
}

/// GET /api/v1/customers/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Customer>>> {
    let customer = state
        .devices
        .find_customer(id)
        .await?
        .ok_or_else(|| CoreError::not_found("Customer", id))?;
    Ok(Json(DataResponse { data: customer }))
}
