use std::sync::Arc;

use emisafe_core::store::DeviceStore;
use emisafe_session::SessionOrchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// The session subsystem: registry, presence, dispatch, broadcast.
    pub orchestrator: Arc<SessionOrchestrator>,
    /// Customer/device store, also reachable through the orchestrator.
    pub devices: Arc<dyn DeviceStore>,
}

impl AppState {
    pub fn new(config: ServerConfig, orchestrator: Arc<SessionOrchestrator>) -> Self {
        let devices = Arc::clone(orchestrator.devices());
        Self {
            config: Arc::new(config),
            orchestrator,
            devices,
        }
    }
}
