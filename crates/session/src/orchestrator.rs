//! Entry point for connection events and administrative overrides.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use emisafe_core::command::DeviceCommand;
use emisafe_core::customer::{Customer, PaymentReceipt};
use emisafe_core::error::{CoreError, CoreResult};
use emisafe_core::presence::{DeviceStatus, PresenceEvent};
use emisafe_core::protocol::{DeviceContext, InboundEvent, OutboundEvent, ReportedResult};
use emisafe_core::store::{CommandStore, DeviceStore};
use emisafe_core::types::DbId;
use futures::FutureExt;

use crate::broadcaster::EventBroadcaster;
use crate::dispatcher::CommandDispatcher;
use crate::presence::PresenceTracker;
use crate::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, Role};

/// Reply text for a device that fails identity validation.
const INVALID_DEVICE_REPLY: &str = "Invalid device or customer";

/// Reply text for an operator registration whose payload does not decode.
const INVALID_ADMIN_REPLY: &str = "Invalid admin registration";

/// Reply text when a registration fails for a reason the client cannot fix.
const INTERNAL_ERROR_REPLY: &str = "Internal server error";

#[derive(Debug, Clone, PartialEq)]
pub struct EmergencyUnlockOutcome {
    pub customer_id: DbId,
    pub device_id: String,
    pub status: DeviceStatus,
    /// Whether the `emergency_unlock` push reached a live connection.
    pub device_notified: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOutcome {
    pub receipt: PaymentReceipt,
    pub device_notified: bool,
}

/// Coordinates the registry, presence tracker, dispatcher, and broadcaster.
///
/// The transport calls [`handle_frame`](Self::handle_frame) for each inbound
/// frame of a connection, one at a time, and
/// [`on_disconnect`](Self::on_disconnect) once when it closes. Every frame
/// is handled in isolation: errors and panics are logged and never reach
/// the transport.
pub struct SessionOrchestrator {
    registry: Arc<ConnectionRegistry>,
    presence: Arc<PresenceTracker>,
    dispatcher: Arc<CommandDispatcher>,
    broadcaster: Arc<EventBroadcaster>,
    devices: Arc<dyn DeviceStore>,
}

impl SessionOrchestrator {
    /// Wire up the whole subsystem around the given stores.
    pub fn new(devices: Arc<dyn DeviceStore>, commands: Arc<dyn CommandStore>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let presence = Arc::new(PresenceTracker::new(Arc::clone(&devices)));
        let broadcaster = Arc::new(EventBroadcaster::new(Arc::clone(&registry)));
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&presence),
            Arc::clone(&broadcaster),
            Arc::clone(&devices),
            commands,
        ));
        Self {
            registry,
            presence,
            dispatcher,
            broadcaster,
            devices,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn presence(&self) -> &Arc<PresenceTracker> {
        &self.presence
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    pub fn devices(&self) -> &Arc<dyn DeviceStore> {
        &self.devices
    }

    /// Track a newly accepted connection so shutdown can close it even if
    /// it never registers.
    pub async fn on_connect(&self, conn: &ConnectionHandle) {
        self.registry.attach(conn.clone()).await;
    }

    /// Decode and handle one text frame received on `conn`.
    pub async fn handle_frame(&self, conn: &ConnectionHandle, text: &str) {
        let event = match InboundEvent::from_json(text) {
            Ok(event) => event,
            Err(e) => {
                let name = InboundEvent::peek_name(text);
                tracing::warn!(
                    conn_id = %conn.id(),
                    event = name.as_deref().unwrap_or("-"),
                    error = %e,
                    "Ignoring malformed frame"
                );
                match name.as_deref() {
                    Some("register_device") => reply(conn, registration_error(INVALID_DEVICE_REPLY)),
                    Some("register_admin") => reply(conn, registration_error(INVALID_ADMIN_REPLY)),
                    _ => {}
                }
                return;
            }
        };
        let name = event.name();
        let handled = AssertUnwindSafe(self.handle_event(conn, event))
            .catch_unwind()
            .await;
        if handled.is_err() {
            tracing::error!(conn_id = %conn.id(), event = name, "Event handler panicked");
            if matches!(name, "register_device" | "register_admin") {
                reply(conn, registration_error(INTERNAL_ERROR_REPLY));
            }
        }
    }

    /// Route a decoded event to its handler and absorb any failure.
    pub async fn handle_event(&self, conn: &ConnectionHandle, event: InboundEvent) {
        match event {
            InboundEvent::RegisterDevice {
                device_id,
                customer_id,
            } => {
                if let Err(e) = self.on_device_register(conn, &device_id, customer_id).await {
                    let message = match e {
                        CoreError::InvalidDevice(_) => {
                            tracing::warn!(device_id = %device_id, customer_id, "Rejected device registration");
                            INVALID_DEVICE_REPLY
                        }
                        other => {
                            tracing::error!(device_id = %device_id, error = %other, "Device registration failed");
                            INTERNAL_ERROR_REPLY
                        }
                    };
                    reply(conn, registration_error(message));
                }
            }
            InboundEvent::RegisterAdmin {
                admin_id,
                admin_name,
            } => {
                if let Err(e) = self.on_admin_register(conn, &admin_id, &admin_name).await {
                    tracing::error!(admin_id = %admin_id, error = %e, "Admin registration failed");
                    reply(conn, registration_error(INTERNAL_ERROR_REPLY));
                }
            }
            InboundEvent::DeviceHeartbeat { device_id } => {
                if let Err(e) = self.on_heartbeat(&device_id).await {
                    tracing::error!(device_id = %device_id, error = %e, "Heartbeat handling failed");
                }
            }
            InboundEvent::CommandResult(report) => match self.on_command_result(&report).await {
                Ok(_) => {}
                Err(CoreError::DuplicateResult { command_id }) => {
                    tracing::warn!(command_id, device_id = %report.device_id, "Dropping duplicate or unknown command result");
                }
                Err(CoreError::Validation(reason)) => {
                    tracing::warn!(device_id = %report.device_id, reason = %reason, "Dropping invalid command result");
                }
                Err(e) => {
                    tracing::error!(
                        command_id = report.command_id,
                        device_id = %report.device_id,
                        error = %e,
                        "Command result handling failed"
                    );
                }
            },
        }
    }

    /// Validate the device against the store, register its connection, and
    /// announce it to operators.
    pub async fn on_device_register(
        &self,
        conn: &ConnectionHandle,
        device_id: &str,
        customer_id: DbId,
    ) -> CoreResult<()> {
        let customer = self
            .devices
            .find_device_customer(device_id)
            .await?
            .filter(|c| c.id == customer_id)
            .ok_or_else(|| {
                CoreError::InvalidDevice(format!(
                    "device {device_id} is not bound to customer {customer_id}"
                ))
            })?;

        if let Some(previous) = self
            .registry
            .register(Role::Device, device_id, conn.clone())
            .await
        {
            tracing::info!(
                device_id,
                old_conn = %previous.id(),
                new_conn = %conn.id(),
                "Device re-registered, replacing previous session"
            );
        }

        let change = match self.presence.apply(device_id, PresenceEvent::Registered).await {
            Ok(change) => change,
            Err(e) => {
                self.registry
                    .remove(Role::Device, device_id, conn.id())
                    .await;
                return Err(e);
            }
        };
        let customer = Customer {
            device_status: change.current,
            last_seen: self
                .presence
                .cached(device_id)
                .await
                .and_then(|r| r.last_seen)
                .or(customer.last_seen),
            ..customer
        };

        reply(
            conn,
            OutboundEvent::RegistrationSuccess {
                device_id: device_id.to_string(),
                customer_id,
                customer: customer.clone(),
                status: "connected",
            },
        );
        self.broadcaster
            .notify_operators(&OutboundEvent::DeviceOnline(DeviceContext::new(
                device_id,
                Some(&customer),
            )))
            .await;

        tracing::info!(device_id, customer_id, status = %change.current, "Device registered");
        Ok(())
    }

    /// Join an operator to the broadcast group and send it the current
    /// customer snapshot. Operators are not validated against any store.
    pub async fn on_admin_register(
        &self,
        conn: &ConnectionHandle,
        admin_id: &str,
        admin_name: &str,
    ) -> CoreResult<()> {
        let customers = self.devices.list_customers().await?;
        self.registry
            .register(Role::Operator, admin_id, conn.clone())
            .await;

        reply(
            conn,
            OutboundEvent::AdminRegistrationSuccess {
                admin_id: admin_id.to_string(),
                admin_name: admin_name.to_string(),
                status: "connected",
                customers,
            },
        );
        tracing::info!(admin_id, admin_name, "Admin connected");
        Ok(())
    }

    /// Refresh last-seen for a registered device. Unregistered devices are
    /// ignored.
    pub async fn on_heartbeat(&self, device_id: &str) -> CoreResult<()> {
        if self.registry.touch(device_id).await.is_none() {
            tracing::trace!(device_id, "Heartbeat from unregistered device ignored");
            return Ok(());
        }
        self.presence
            .apply(device_id, PresenceEvent::Heartbeat)
            .await?;
        Ok(())
    }

    pub async fn on_command_result(&self, report: &ReportedResult) -> CoreResult<DeviceCommand> {
        self.dispatcher.report_result(report).await
    }

    /// Tear down everything registered by a closed connection.
    ///
    /// Only entries still owned by `connection` are removed, so a device
    /// that already re-registered elsewhere stays registered and its
    /// presence is left alone.
    pub async fn on_disconnect(&self, connection: ConnectionId) {
        for (role, id) in self.registry.remove_connection(connection).await {
            match role {
                Role::Device => self.device_disconnected(&id).await,
                Role::Operator => {
                    tracing::info!(admin_id = %id, conn_id = %connection, "Admin disconnected");
                }
            }
        }
    }

    async fn device_disconnected(&self, device_id: &str) {
        // A replacement session may have registered since the entry was
        // removed; it owns presence from here on.
        let registry = Arc::clone(&self.registry);
        let no_live_session = || async move {
            registry.lookup(Role::Device, device_id).await.is_none()
        };
        let status = match self
            .presence
            .apply_if(device_id, PresenceEvent::Disconnected, no_live_session)
            .await
        {
            Ok(Some(change)) => Some(change.current),
            Ok(None) => {
                tracing::info!(device_id, "Device reconnected before disconnect was applied");
                return;
            }
            Err(e) => {
                tracing::error!(device_id, error = %e, "Failed to record disconnect");
                None
            }
        };
        let customer = self
            .devices
            .find_device_customer(device_id)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(device_id, error = %e, "Customer lookup failed");
                None
            });

        self.broadcaster
            .notify_operators(&OutboundEvent::DeviceOffline(DeviceContext::new(
                device_id,
                customer.as_ref(),
            )))
            .await;
        tracing::info!(device_id, status = ?status, "Device disconnected");
    }

    /// Administrative unlock that bypasses the command lifecycle.
    ///
    /// No command record is written.
    pub async fn emergency_unlock(&self, customer_id: DbId) -> CoreResult<EmergencyUnlockOutcome> {
        let customer = self
            .devices
            .find_customer(customer_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Customer", customer_id))?;

        let change = self
            .presence
            .apply(&customer.device_id, PresenceEvent::EmergencyUnlock)
            .await?;
        let device_notified = self
            .push_to_device(&customer.device_id, &OutboundEvent::emergency_unlock())
            .await;

        if change.changed() {
            self.broadcaster
                .notify_operators(&OutboundEvent::DeviceUnlocked(DeviceContext::new(
                    customer.device_id.clone(),
                    Some(&customer),
                )))
                .await;
        }

        tracing::info!(
            customer_id,
            device_id = %customer.device_id,
            status = %change.current,
            device_notified,
            "Emergency unlock applied"
        );
        Ok(EmergencyUnlockOutcome {
            customer_id,
            device_id: customer.device_id,
            status: change.current,
            device_notified,
        })
    }

    /// Record a payment, tell the device, and notify operators.
    ///
    /// `amount` defaults to one EMI. No command record is written.
    pub async fn record_payment(
        &self,
        customer_id: DbId,
        amount: Option<i64>,
    ) -> CoreResult<PaymentOutcome> {
        if let Some(amount) = amount.filter(|a| *a <= 0) {
            return Err(CoreError::Validation(format!(
                "payment amount must be positive, got {amount}"
            )));
        }

        let receipt = self
            .devices
            .record_payment(customer_id, amount)
            .await?
            .ok_or_else(|| CoreError::not_found("Customer", customer_id))?;

        let device_notified = self
            .push_to_device(
                &receipt.customer.device_id,
                &OutboundEvent::PaymentReceived {
                    customer_id: None,
                    customer_name: None,
                    amount: receipt.amount,
                    remaining_overdue: receipt.remaining_overdue,
                },
            )
            .await;
        self.broadcaster
            .notify_operators(&OutboundEvent::PaymentReceived {
                customer_id: Some(receipt.customer.id),
                customer_name: Some(receipt.customer.name.clone()),
                amount: receipt.amount,
                remaining_overdue: receipt.remaining_overdue,
            })
            .await;

        tracing::info!(
            customer_id,
            amount = receipt.amount,
            remaining_overdue = receipt.remaining_overdue,
            "Payment recorded"
        );
        Ok(PaymentOutcome {
            receipt,
            device_notified,
        })
    }

    async fn push_to_device(&self, device_id: &str, event: &OutboundEvent) -> bool {
        let Some(handle) = self.registry.lookup(Role::Device, device_id).await else {
            return false;
        };
        match handle.push_event(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(device_id, event = event.name(), error = %e, "Device push failed");
                false
            }
        }
    }

    /// Close every live connection. Used on shutdown.
    pub async fn shutdown(&self) {
        let count = self.registry.close_all().await;
        tracing::info!(count, "Session orchestrator shut down");
    }
}

fn registration_error(message: &str) -> OutboundEvent {
    OutboundEvent::RegistrationError {
        error: message.to_string(),
    }
}

fn reply(conn: &ConnectionHandle, event: OutboundEvent) {
    if let Err(e) = conn.push_event(&event) {
        tracing::warn!(conn_id = %conn.id(), event = event.name(), error = %e, "Reply not delivered");
    }
}

#[cfg(test)]
mod tests {
    use emisafe_core::store::InMemoryStore;
    use tokio::sync::mpsc;

    use super::*;
    use crate::registry::Outbound;

    fn orchestrator() -> SessionOrchestrator {
        let store = Arc::new(InMemoryStore::with_demo_fleet());
        SessionOrchestrator::new(store.clone(), store)
    }

    fn events(rx: &mut mpsc::Receiver<Outbound>) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(Outbound::Text(text)) = rx.try_recv() {
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            names.push(value["event"].as_str().unwrap_or_default().to_string());
        }
        names
    }

    #[tokio::test]
    async fn late_disconnect_of_replaced_session_keeps_device_online() {
        let orchestrator = orchestrator();
        let (admin, mut admin_rx) = ConnectionHandle::channel(16);
        orchestrator.on_admin_register(&admin, "admin-1", "Ops").await.unwrap();

        let (old, _old_rx) = ConnectionHandle::channel(16);
        orchestrator.on_device_register(&old, "device_001", 1).await.unwrap();

        // The old socket's entry is removed, then the device reconnects
        // before the old disconnect reaches presence.
        let removed = orchestrator.registry.remove_connection(old.id()).await;
        assert_eq!(removed, vec![(Role::Device, "device_001".to_string())]);
        let (new, _new_rx) = ConnectionHandle::channel(16);
        orchestrator.on_device_register(&new, "device_001", 1).await.unwrap();
        events(&mut admin_rx);

        orchestrator.device_disconnected("device_001").await;

        assert_eq!(
            orchestrator.presence.status("device_001").await.unwrap(),
            DeviceStatus::Online
        );
        assert!(events(&mut admin_rx).is_empty());
        let live = orchestrator.registry.lookup(Role::Device, "device_001").await;
        assert_eq!(live.map(|h| h.id()), Some(new.id()));
    }

    #[tokio::test]
    async fn disconnect_without_replacement_goes_offline() {
        let orchestrator = orchestrator();
        let (admin, mut admin_rx) = ConnectionHandle::channel(16);
        orchestrator.on_admin_register(&admin, "admin-1", "Ops").await.unwrap();
        let (device, _device_rx) = ConnectionHandle::channel(16);
        orchestrator.on_device_register(&device, "device_001", 1).await.unwrap();
        events(&mut admin_rx);

        orchestrator.on_disconnect(device.id()).await;

        assert_eq!(
            orchestrator.presence.status("device_001").await.unwrap(),
            DeviceStatus::Offline
        );
        assert_eq!(events(&mut admin_rx), vec!["device_offline"]);
    }

    #[tokio::test]
    async fn shutdown_closes_connections_that_never_registered() {
        let orchestrator = orchestrator();
        let (idle, mut idle_rx) = ConnectionHandle::channel(4);
        orchestrator.on_connect(&idle).await;

        orchestrator.shutdown().await;

        assert_eq!(idle_rx.try_recv(), Ok(Outbound::Close));
    }
}
