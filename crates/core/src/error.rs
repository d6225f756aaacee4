use crate::presence::DeviceStatus;
use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    /// The target device has no live connection. The command was still
    /// persisted (as `failed`) under `command_id`; `device_status` is the
    /// stored status at dispatch time.
    #[error("Device not connected: {device_id}")]
    NotConnected {
        device_id: String,
        command_id: DbId,
        device_status: DeviceStatus,
    },

    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    /// A result arrived for a command that is unknown or already terminal.
    #[error("Duplicate or unknown command result: {command_id}")]
    DuplicateResult { command_id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
