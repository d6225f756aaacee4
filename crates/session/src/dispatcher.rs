//! Command creation, delivery, and result handling.

use std::sync::Arc;

use chrono::{NaiveTime, Utc};
use emisafe_core::command::{
    clamp_history_limit, CommandCompletion, CommandStatus, CommandType, DeviceCommand, NewCommand,
};
use emisafe_core::customer::{Customer, DashboardStats};
use emisafe_core::error::{CoreError, CoreResult};
use emisafe_core::presence::{DeviceStatus, PresenceEvent};
use emisafe_core::protocol::{DeviceContext, OutboundEvent, ReportedResult};
use emisafe_core::store::{CommandStore, DeviceStore};
use emisafe_core::types::DbId;

use crate::broadcaster::EventBroadcaster;
use crate::presence::PresenceTracker;
use crate::registry::{ConnectionRegistry, Role};

/// Owns the command lifecycle: `pending` on issue, terminal on the first
/// accepted result (or immediately `failed` when the device is not
/// connected).
///
/// Delivery is at-most-once: the `device_command` push is not acknowledged
/// and a pending command waits until the device reports a result.
pub struct CommandDispatcher {
    registry: Arc<ConnectionRegistry>,
    presence: Arc<PresenceTracker>,
    broadcaster: Arc<EventBroadcaster>,
    devices: Arc<dyn DeviceStore>,
    commands: Arc<dyn CommandStore>,
}

impl CommandDispatcher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        presence: Arc<PresenceTracker>,
        broadcaster: Arc<EventBroadcaster>,
        devices: Arc<dyn DeviceStore>,
        commands: Arc<dyn CommandStore>,
    ) -> Self {
        Self {
            registry,
            presence,
            broadcaster,
            devices,
            commands,
        }
    }

    /// Persist a command for `device_id` and push it to the live connection.
    ///
    /// Without a live connection the command is stored as `failed` with
    /// "Device not connected" and [`CoreError::NotConnected`] is returned.
    pub async fn issue_command(
        &self,
        device_id: &str,
        command_type: CommandType,
        payload: serde_json::Value,
    ) -> CoreResult<DeviceCommand> {
        let customer = self
            .devices
            .find_device_customer(device_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Device", device_id))?;
        self.issue(&customer, command_type, payload).await
    }

    /// Same as [`issue_command`](Self::issue_command), addressing the device
    /// through its owning customer.
    pub async fn issue_for_customer(
        &self,
        customer_id: DbId,
        command_type: CommandType,
        payload: serde_json::Value,
    ) -> CoreResult<DeviceCommand> {
        let customer = self
            .devices
            .find_customer(customer_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Customer", customer_id))?;
        self.issue(&customer, command_type, payload).await
    }

    async fn issue(
        &self,
        customer: &Customer,
        command_type: CommandType,
        payload: serde_json::Value,
    ) -> CoreResult<DeviceCommand> {
        let payload = if payload.is_null() {
            serde_json::json!({})
        } else {
            payload
        };
        let command = self
            .commands
            .insert_command(&NewCommand {
                customer_id: customer.id,
                device_id: customer.device_id.clone(),
                command_type,
                payload,
            })
            .await?;

        let frame = OutboundEvent::DeviceCommand {
            command_id: command.id,
            command: command.command_type.clone(),
            payload: command.payload.clone(),
        };
        let pushed = match self.registry.lookup(Role::Device, &command.device_id).await {
            Some(handle) => handle.push_event(&frame).map_err(|e| e.to_string()),
            None => Err("no registered connection".to_string()),
        };

        match pushed {
            Ok(()) => {
                tracing::info!(
                    command_id = command.id,
                    device_id = %command.device_id,
                    command = %command.command_type,
                    "Command sent to device"
                );
                Ok(command)
            }
            Err(reason) => {
                tracing::info!(
                    command_id = command.id,
                    device_id = %command.device_id,
                    reason = %reason,
                    "Device not reachable, failing command"
                );
                self.commands
                    .complete_command(command.id, &CommandCompletion::not_connected(Utc::now()))
                    .await?;
                Err(CoreError::NotConnected {
                    device_id: command.device_id,
                    command_id: command.id,
                    device_status: customer.device_status,
                })
            }
        }
    }

    /// Apply a device-reported outcome.
    ///
    /// Only the first result for a pending command is accepted; later or
    /// unknown reports yield [`CoreError::DuplicateResult`] and change
    /// nothing.
    pub async fn report_result(&self, report: &ReportedResult) -> CoreResult<DeviceCommand> {
        if !report.status.is_terminal() {
            return Err(CoreError::Validation(format!(
                "result for command {} must be success or failed",
                report.command_id
            )));
        }

        let command = self
            .commands
            .find_command(report.command_id)
            .await?
            .ok_or(CoreError::DuplicateResult {
                command_id: report.command_id,
            })?;
        if command.device_id != report.device_id {
            return Err(CoreError::Validation(format!(
                "command {} does not belong to device {}",
                command.id, report.device_id
            )));
        }

        let completion = CommandCompletion {
            status: report.status,
            result: report.result.clone(),
            error: report.error.clone(),
            completed_at: Utc::now(),
        };
        let completed = self
            .commands
            .complete_command(command.id, &completion)
            .await?
            .ok_or(CoreError::DuplicateResult {
                command_id: command.id,
            })?;
        tracing::info!(
            command_id = completed.id,
            device_id = %completed.device_id,
            status = %completed.status,
            "Command result recorded"
        );

        let customer = match self.devices.find_device_customer(&completed.device_id).await {
            Ok(customer) => customer,
            Err(e) => {
                tracing::error!(device_id = %completed.device_id, error = %e, "Customer lookup failed");
                None
            }
        };
        let context = DeviceContext::new(completed.device_id.clone(), customer.as_ref());

        if completed.status == CommandStatus::Success {
            self.apply_lock_state(&completed, context.clone()).await;
        }

        self.broadcaster
            .notify_operators(&OutboundEvent::CommandCompleted {
                device_id: completed.device_id.clone(),
                command_id: completed.id,
                command_type: Some(completed.command_type.clone()),
                status: completed.status,
                result: completed.result.clone(),
                error: completed.error.clone(),
                customer_id: context.customer_id,
                customer_name: context.customer_name,
            })
            .await;

        Ok(completed)
    }

    async fn apply_lock_state(&self, command: &DeviceCommand, context: DeviceContext) {
        let event = match command.command_type {
            CommandType::LockDevice => PresenceEvent::LockSucceeded,
            CommandType::UnlockDevice => PresenceEvent::UnlockSucceeded,
            CommandType::Other(_) => return,
        };
        match self.presence.apply(&command.device_id, event).await {
            Ok(change) if change.changed() => {
                let notice = match change.current {
                    DeviceStatus::Locked => OutboundEvent::DeviceLocked(context),
                    _ => OutboundEvent::DeviceUnlocked(context),
                };
                self.broadcaster.notify_operators(&notice).await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(
                    command_id = command.id,
                    device_id = %command.device_id,
                    error = %e,
                    "Failed to apply lock state"
                );
            }
        }
    }

    /// Commands for a device, most recent first. `limit` defaults to 20.
    pub async fn list_command_history(
        &self,
        device_id: &str,
        limit: Option<i64>,
    ) -> CoreResult<Vec<DeviceCommand>> {
        self.commands
            .list_device_commands(device_id, clamp_history_limit(limit))
            .await
    }

    pub async fn dashboard_stats(&self) -> CoreResult<DashboardStats> {
        let customers = self.devices.list_customers().await?;
        let mut stats = DashboardStats::from_customers(&customers);
        stats.connected_devices = self.registry.count(Role::Device).await;

        let start_of_day = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
        stats.commands_today = self.commands.count_commands_since(start_of_day).await?;
        Ok(stats)
    }
}
