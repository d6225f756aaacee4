use std::sync::Arc;
use std::time::Duration;

use emisafe_session::{ConnectionRegistry, Role};
use tokio_util::sync::CancellationToken;

/// Spawn a background task that queues a Ping on every registered
/// connection each `interval`.
///
/// Runs until `cancel` is triggered during shutdown.
pub fn start_heartbeat(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; skip it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let devices = registry.count(Role::Device).await;
                    let operators = registry.count(Role::Operator).await;
                    tracing::debug!(devices, operators, "WebSocket heartbeat ping");
                    registry.ping_all().await;
                }
            }
        }
        tracing::debug!("Heartbeat task stopped");
    })
}
