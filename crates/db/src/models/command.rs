//! Device command rows.

use emisafe_core::command::{CommandStatus, CommandType, DeviceCommand};
use emisafe_core::error::CoreError;
use emisafe_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `device_commands` table.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceCommandRow {
    pub id: DbId,
    pub customer_id: DbId,
    pub device_id: String,
    pub command_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl TryFrom<DeviceCommandRow> for DeviceCommand {
    type Error = CoreError;

    fn try_from(row: DeviceCommandRow) -> Result<Self, Self::Error> {
        let command_type: CommandType = row
            .command_type
            .parse()
            .map_err(|e| CoreError::Internal(format!("command {}: {e}", row.id)))?;
        let status: CommandStatus = row
            .status
            .parse()
            .map_err(|e| CoreError::Internal(format!("command {}: {e}", row.id)))?;

        Ok(DeviceCommand {
            id: row.id,
            customer_id: row.customer_id,
            device_id: row.device_id,
            command_type,
            payload: row.payload,
            status,
            created_at: row.created_at,
            completed_at: row.completed_at,
            result: row.result,
            error: row.error,
        })
    }
}
