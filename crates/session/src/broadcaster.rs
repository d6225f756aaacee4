//! Event fan-out to connected operator dashboards.

use std::sync::Arc;

use emisafe_core::protocol::OutboundEvent;

use crate::registry::{ConnectionRegistry, Outbound, PushError, Role};

/// Delivers operator events to every registered operator connection.
///
/// Each recipient gets a non-blocking push: a full or closed queue skips
/// that operator only. Nothing is retried or replayed to operators that
/// register later; they load a fresh snapshot on registration instead.
pub struct EventBroadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl EventBroadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Push `event` to all operators. Returns how many accepted it.
    pub async fn notify_operators(&self, event: &OutboundEvent) -> usize {
        let json: Arc<str> = match event.to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::warn!(event = event.name(), error = %e, "Failed to encode operator event");
                return 0;
            }
        };

        let operators = self.registry.handles(Role::Operator).await;
        let mut delivered = 0;
        for handle in &operators {
            match handle.push(Outbound::Text(Arc::clone(&json))) {
                Ok(()) => delivered += 1,
                Err(PushError::Full) => {
                    tracing::warn!(
                        conn_id = %handle.id(),
                        event = event.name(),
                        "Operator queue full, dropping event"
                    );
                }
                Err(e) => {
                    tracing::debug!(conn_id = %handle.id(), error = %e, "Skipping operator");
                }
            }
        }

        tracing::debug!(
            event = event.name(),
            recipients = operators.len(),
            delivered,
            "Broadcast operator event"
        );
        delivered
    }
}
