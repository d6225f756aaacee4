//! Repository for the `device_commands` table.

use emisafe_core::command::{CommandCompletion, NewCommand};
use emisafe_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::command::DeviceCommandRow;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, customer_id, device_id, command_type, payload, status, \
                        result, error, created_at, completed_at";

pub struct DeviceCommandRepo;

impl DeviceCommandRepo {
    /// Insert a `pending` command, returning the created row.
    pub async fn create(pool: &PgPool, input: &NewCommand) -> Result<DeviceCommandRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO device_commands (customer_id, device_id, command_type, payload)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DeviceCommandRow>(&query)
            .bind(input.customer_id)
            .bind(&input.device_id)
            .bind(input.command_type.as_str())
            .bind(&input.payload)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<DeviceCommandRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM device_commands WHERE id = $1");
        sqlx::query_as::<_, DeviceCommandRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Write the terminal outcome onto a command that is still `pending`.
    ///
    /// Returns `None` when the command does not exist or was already
    /// completed; the row is left untouched in that case.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        completion: &CommandCompletion,
    ) -> Result<Option<DeviceCommandRow>, sqlx::Error> {
        let query = format!(
            "UPDATE device_commands
             SET status = $2, result = $3, error = $4, completed_at = $5
             WHERE id = $1 AND status = 'pending'
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DeviceCommandRow>(&query)
            .bind(id)
            .bind(completion.status.as_str())
            .bind(&completion.result)
            .bind(&completion.error)
            .bind(completion.completed_at)
            .fetch_optional(pool)
            .await
    }

    /// Most recent commands for a device, newest first.
    pub async fn list_for_device(
        pool: &PgPool,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<DeviceCommandRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM device_commands
             WHERE device_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2"
        );
        sqlx::query_as::<_, DeviceCommandRow>(&query)
            .bind(device_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    pub async fn count_since(pool: &PgPool, since: Timestamp) -> Result<i64, sqlx::Error> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM device_commands WHERE created_at >= $1")
                .bind(since)
                .fetch_one(pool)
                .await?;
        Ok(row.0)
    }
}
