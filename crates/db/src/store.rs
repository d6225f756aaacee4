//! `emisafe-core` store traits backed by PostgreSQL.

use async_trait::async_trait;
use emisafe_core::command::{CommandCompletion, DeviceCommand, NewCommand};
use emisafe_core::customer::{Customer, PaymentReceipt};
use emisafe_core::error::{CoreError, CoreResult};
use emisafe_core::presence::DeviceStatus;
use emisafe_core::store::{CommandStore, DeviceStore};
use emisafe_core::types::{DbId, Timestamp};

use crate::repositories::{CustomerRepo, DeviceCommandRepo};
use crate::DbPool;

/// Both stores over one connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// Log a database failure and hide its details behind `CoreError::Internal`.
fn db_error(operation: &'static str) -> impl FnOnce(sqlx::Error) -> CoreError {
    move |e| {
        tracing::error!(operation, error = %e, "Database error");
        CoreError::Internal(format!("database error during {operation}"))
    }
}

#[async_trait]
impl DeviceStore for PgStore {
    async fn find_device_customer(&self, device_id: &str) -> CoreResult<Option<Customer>> {
        CustomerRepo::find_by_device_id(&self.pool, device_id)
            .await
            .map_err(db_error("find_device_customer"))?
            .map(Customer::try_from)
            .transpose()
    }

    async fn find_customer(&self, customer_id: DbId) -> CoreResult<Option<Customer>> {
        CustomerRepo::find_by_id(&self.pool, customer_id)
            .await
            .map_err(db_error("find_customer"))?
            .map(Customer::try_from)
            .transpose()
    }

    async fn list_customers(&self) -> CoreResult<Vec<Customer>> {
        CustomerRepo::list(&self.pool)
            .await
            .map_err(db_error("list_customers"))?
            .into_iter()
            .map(Customer::try_from)
            .collect()
    }

    async fn set_device_status(&self, device_id: &str, status: DeviceStatus) -> CoreResult<bool> {
        CustomerRepo::update_device_status(&self.pool, device_id, status)
            .await
            .map_err(db_error("set_device_status"))
    }

    async fn mark_last_seen(&self, device_id: &str, at: Timestamp) -> CoreResult<bool> {
        CustomerRepo::touch_last_seen(&self.pool, device_id, at)
            .await
            .map_err(db_error("mark_last_seen"))
    }

    async fn record_payment(
        &self,
        customer_id: DbId,
        amount: Option<i64>,
    ) -> CoreResult<Option<PaymentReceipt>> {
        let Some((paid, remaining_overdue)) =
            CustomerRepo::apply_payment(&self.pool, customer_id, amount)
                .await
                .map_err(db_error("record_payment"))?
        else {
            return Ok(None);
        };
        let Some(customer) = self.find_customer(customer_id).await? else {
            return Ok(None);
        };
        Ok(Some(PaymentReceipt {
            customer,
            amount: paid,
            remaining_overdue,
        }))
    }

    async fn health_check(&self) -> CoreResult<()> {
        crate::health_check(&self.pool)
            .await
            .map_err(db_error("health_check"))
    }
}

#[async_trait]
impl CommandStore for PgStore {
    async fn insert_command(&self, command: &NewCommand) -> CoreResult<DeviceCommand> {
        DeviceCommandRepo::create(&self.pool, command)
            .await
            .map_err(db_error("insert_command"))?
            .try_into()
    }

    async fn find_command(&self, command_id: DbId) -> CoreResult<Option<DeviceCommand>> {
        DeviceCommandRepo::find_by_id(&self.pool, command_id)
            .await
            .map_err(db_error("find_command"))?
            .map(DeviceCommand::try_from)
            .transpose()
    }

    async fn complete_command(
        &self,
        command_id: DbId,
        completion: &CommandCompletion,
    ) -> CoreResult<Option<DeviceCommand>> {
        DeviceCommandRepo::complete(&self.pool, command_id, completion)
            .await
            .map_err(db_error("complete_command"))?
            .map(DeviceCommand::try_from)
            .transpose()
    }

    async fn list_device_commands(
        &self,
        device_id: &str,
        limit: i64,
    ) -> CoreResult<Vec<DeviceCommand>> {
        DeviceCommandRepo::list_for_device(&self.pool, device_id, limit)
            .await
            .map_err(db_error("list_device_commands"))?
            .into_iter()
            .map(DeviceCommand::try_from)
            .collect()
    }

    async fn count_commands_since(&self, since: Timestamp) -> CoreResult<i64> {
        DeviceCommandRepo::count_since(&self.pool, since)
            .await
            .map_err(db_error("count_commands_since"))
    }
}
