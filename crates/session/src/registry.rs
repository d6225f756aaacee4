//! Live connection registry.
//!
//! Maps device ids and operator ids to the outbound channel of the
//! connection currently serving them. Entries are ephemeral and never
//! persisted.

use std::collections::HashMap;
use std::sync::Arc;

use emisafe_core::protocol::OutboundEvent;
use emisafe_core::types::Timestamp;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};

/// Unique id assigned to each accepted connection.
pub type ConnectionId = uuid::Uuid;

/// A frame queued for delivery on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Serialized [`OutboundEvent`] JSON.
    Text(Arc<str>),
    Ping,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    #[error("outbound queue is full")]
    Full,
    #[error("connection is closed")]
    Closed,
    #[error("failed to encode event: {0}")]
    Encode(String),
}

/// Cloneable sending side of one connection.
///
/// Pushes never wait: a full queue drops the frame and reports
/// [`PushError::Full`].
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::Sender<Outbound>,
}

impl ConnectionHandle {
    /// Create a handle with a fresh id plus the receiver the connection's
    /// writer task drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: uuid::Uuid::new_v4(),
            sender,
        };
        (handle, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn push(&self, message: Outbound) -> Result<(), PushError> {
        self.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => PushError::Full,
            TrySendError::Closed(_) => PushError::Closed,
        })
    }

    pub fn push_event(&self, event: &OutboundEvent) -> Result<(), PushError> {
        let json = event
            .to_json()
            .map_err(|e| PushError::Encode(e.to_string()))?;
        self.push(Outbound::Text(json.into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Device,
    Operator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Device => "device",
            Role::Operator => "operator",
        }
    }
}

/// Registry entry for one registered identifier.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub handle: ConnectionHandle,
    pub connected_at: Timestamp,
    pub last_seen: Timestamp,
}

/// Registered devices and operators, one live connection per identifier.
///
/// Each role map sits behind its own `RwLock`. Registering an identifier
/// that already has an entry replaces it (last writer wins); removals carry
/// the connection id and only delete an entry still owned by that
/// connection, so a stale connection closing cannot evict its replacement.
///
/// Accepted sockets are also tracked by connection id, registered or not,
/// so shutdown reaches every one of them.
pub struct ConnectionRegistry {
    devices: RwLock<HashMap<String, ConnectionEntry>>,
    operators: RwLock<HashMap<String, ConnectionEntry>>,
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            operators: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Track a freshly accepted connection before it registers.
    pub async fn attach(&self, handle: ConnectionHandle) {
        self.connections.write().await.insert(handle.id(), handle);
    }

    /// Number of accepted connections, registered or not.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    fn map(&self, role: Role) -> &RwLock<HashMap<String, ConnectionEntry>> {
        match role {
            Role::Device => &self.devices,
            Role::Operator => &self.operators,
        }
    }

    /// Store or replace the entry for `id`.
    ///
    /// Returns the previously registered handle when it belonged to a
    /// different connection.
    pub async fn register(
        &self,
        role: Role,
        id: &str,
        handle: ConnectionHandle,
    ) -> Option<ConnectionHandle> {
        let now = chrono::Utc::now();
        let entry = ConnectionEntry {
            handle,
            connected_at: now,
            last_seen: now,
        };
        let new_id = entry.handle.id();
        let previous = self.map(role).write().await.insert(id.to_string(), entry);
        previous
            .map(|prev| prev.handle)
            .filter(|prev| prev.id() != new_id)
    }

    pub async fn lookup(&self, role: Role, id: &str) -> Option<ConnectionHandle> {
        self.map(role)
            .read()
            .await
            .get(id)
            .map(|entry| entry.handle.clone())
    }

    pub async fn entry(&self, role: Role, id: &str) -> Option<ConnectionEntry> {
        self.map(role).read().await.get(id).cloned()
    }

    /// Remove `id` if it is still served by `connection`.
    pub async fn remove(&self, role: Role, id: &str, connection: ConnectionId) -> bool {
        let mut map = self.map(role).write().await;
        match map.get(id) {
            Some(entry) if entry.handle.id() == connection => {
                map.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Forget `connection` and remove every entry it owns, returning what
    /// was removed.
    pub async fn remove_connection(&self, connection: ConnectionId) -> Vec<(Role, String)> {
        self.connections.write().await.remove(&connection);
        let mut removed = Vec::new();
        for role in [Role::Device, Role::Operator] {
            let mut map = self.map(role).write().await;
            map.retain(|id, entry| {
                if entry.handle.id() == connection {
                    removed.push((role, id.clone()));
                    false
                } else {
                    true
                }
            });
        }
        removed
    }

    /// Refresh a device's last-seen time. Returns `None` if not registered.
    pub async fn touch(&self, device_id: &str) -> Option<Timestamp> {
        let mut devices = self.devices.write().await;
        let entry = devices.get_mut(device_id)?;
        entry.last_seen = chrono::Utc::now();
        Some(entry.last_seen)
    }

    pub async fn handles(&self, role: Role) -> Vec<ConnectionHandle> {
        self.map(role)
            .read()
            .await
            .values()
            .map(|entry| entry.handle.clone())
            .collect()
    }

    pub async fn count(&self, role: Role) -> usize {
        self.map(role).read().await.len()
    }

    /// Queue a Ping on every registered connection.
    pub async fn ping_all(&self) {
        for handle in self.all_handles().await {
            let _ = handle.push(Outbound::Ping);
        }
    }

    /// Queue one Close on every known connection, then clear the registry.
    /// Returns the number of distinct connections closed.
    pub async fn close_all(&self) -> usize {
        let mut devices = self.devices.write().await;
        let mut operators = self.operators.write().await;
        let mut connections = self.connections.write().await;

        let mut targets: HashMap<ConnectionId, ConnectionHandle> = connections.drain().collect();
        for entry in devices.values().chain(operators.values()) {
            targets
                .entry(entry.handle.id())
                .or_insert_with(|| entry.handle.clone());
        }
        for handle in targets.values() {
            let _ = handle.push(Outbound::Close);
        }
        devices.clear();
        operators.clear();

        let count = targets.len();
        tracing::info!(count, "Closed all connections");
        count
    }

    async fn all_handles(&self) -> Vec<ConnectionHandle> {
        let mut handles = self.handles(Role::Device).await;
        handles.extend(self.handles(Role::Operator).await);
        handles
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
