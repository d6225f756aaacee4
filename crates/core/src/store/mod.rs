//! Narrow interfaces to the external customer/device and command stores.
//!
//! The session subsystem never talks to a database directly; it goes through
//! these traits. `emisafe-db` implements them over PostgreSQL and
//! [`InMemoryStore`] implements them for development and tests.

mod memory;

use async_trait::async_trait;

pub use memory::InMemoryStore;

use crate::command::{CommandCompletion, DeviceCommand, NewCommand};
use crate::customer::{Customer, PaymentReceipt};
use crate::error::CoreResult;
use crate::presence::DeviceStatus;
use crate::types::{DbId, Timestamp};

/// Read/write access to customers and the devices bound to them.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// The customer owning `device_id`, if any.
    async fn find_device_customer(&self, device_id: &str) -> CoreResult<Option<Customer>>;

    async fn find_customer(&self, customer_id: DbId) -> CoreResult<Option<Customer>>;

    /// Every customer, ordered by id.
    async fn list_customers(&self) -> CoreResult<Vec<Customer>>;

    /// Persist a presence status. Returns `false` if the device is unknown.
    async fn set_device_status(&self, device_id: &str, status: DeviceStatus) -> CoreResult<bool>;

    /// Persist the last time the device was heard from.
    async fn mark_last_seen(&self, device_id: &str, at: Timestamp) -> CoreResult<bool>;

    /// Apply a payment to the customer's loan. `None` amount means one EMI.
    /// Returns `None` if the customer or loan does not exist.
    async fn record_payment(
        &self,
        customer_id: DbId,
        amount: Option<i64>,
    ) -> CoreResult<Option<PaymentReceipt>>;

    /// Cheap connectivity probe used by the health endpoint.
    async fn health_check(&self) -> CoreResult<()>;
}

/// Durable command history. Authoritative for command state.
#[async_trait]
pub trait CommandStore: Send + Sync {
    /// Insert a new command with status `pending`.
    async fn insert_command(&self, command: &NewCommand) -> CoreResult<DeviceCommand>;

    async fn find_command(&self, command_id: DbId) -> CoreResult<Option<DeviceCommand>>;

    /// Move a `pending` command to its terminal state.
    ///
    /// Atomic per command: only a row still in `pending` is updated. Returns
    /// `None` when the command is unknown or already terminal, in which case
    /// nothing is written.
    async fn complete_command(
        &self,
        command_id: DbId,
        completion: &CommandCompletion,
    ) -> CoreResult<Option<DeviceCommand>>;

    /// Commands for `device_id`, most recent first, at most `limit` rows.
    async fn list_device_commands(
        &self,
        device_id: &str,
        limit: i64,
    ) -> CoreResult<Vec<DeviceCommand>>;

    /// Number of commands created at or after `since`.
    async fn count_commands_since(&self, since: Timestamp) -> CoreResult<i64>;
}
