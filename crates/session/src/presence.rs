//! In-memory presence cache with write-through to the device store.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use emisafe_core::error::{CoreError, CoreResult};
use emisafe_core::presence::{transition, DeviceStatus, PresenceEvent};
use emisafe_core::store::DeviceStore;
use emisafe_core::types::Timestamp;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone, PartialEq)]
pub struct PresenceRecord {
    pub device_id: String,
    pub status: DeviceStatus,
    pub last_seen: Option<Timestamp>,
}

/// Result of applying one presence event.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceChange {
    pub device_id: String,
    pub previous: DeviceStatus,
    pub current: DeviceStatus,
}

impl PresenceChange {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

type Slot = Arc<Mutex<Option<PresenceRecord>>>;

/// Derives device status from session events.
///
/// Every device has its own slot lock, so events for one device apply in
/// order while different devices proceed independently. A slot is filled
/// from the store on first use; the store is written before the cache, so
/// a failed write leaves the cached state untouched.
pub struct PresenceTracker {
    store: Arc<dyn DeviceStore>,
    slots: RwLock<HashMap<String, Slot>>,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self {
            store,
            slots: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, device_id: &str) -> Slot {
        if let Some(slot) = self.slots.read().await.get(device_id) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(device_id.to_string()).or_default())
    }

    async fn load(&self, device_id: &str) -> CoreResult<PresenceRecord> {
        let customer = self
            .store
            .find_device_customer(device_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Device", device_id))?;
        Ok(PresenceRecord {
            device_id: device_id.to_string(),
            status: customer.device_status,
            last_seen: customer.last_seen,
        })
    }

    /// Apply `event` to the device and persist the outcome.
    pub async fn apply(&self, device_id: &str, event: PresenceEvent) -> CoreResult<PresenceChange> {
        let slot = self.slot(device_id).await;
        let mut cached = slot.lock().await;
        self.apply_locked(device_id, event, &mut cached).await
    }

    /// Like [`apply`](Self::apply), but first evaluates `guard` while the
    /// device's slot is held. Returns `None` without touching anything when
    /// the guard says no. Other events for the device wait until this one
    /// is done.
    pub async fn apply_if<F, Fut>(
        &self,
        device_id: &str,
        event: PresenceEvent,
        guard: F,
    ) -> CoreResult<Option<PresenceChange>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        let slot = self.slot(device_id).await;
        let mut cached = slot.lock().await;
        if !guard().await {
            return Ok(None);
        }
        self.apply_locked(device_id, event, &mut cached)
            .await
            .map(Some)
    }

    async fn apply_locked(
        &self,
        device_id: &str,
        event: PresenceEvent,
        cached: &mut Option<PresenceRecord>,
    ) -> CoreResult<PresenceChange> {
        let mut record = match cached.as_ref() {
            Some(record) => record.clone(),
            None => self.load(device_id).await?,
        };
        let previous = record.status;
        let current = transition(previous, event);

        if current != previous && !self.store.set_device_status(device_id, current).await? {
            return Err(CoreError::not_found("Device", device_id));
        }
        if event.is_contact() {
            let now = chrono::Utc::now();
            self.store.mark_last_seen(device_id, now).await?;
            record.last_seen = Some(now);
        }
        record.status = current;
        *cached = Some(record);

        if current != previous {
            tracing::debug!(
                device_id,
                ?event,
                from = %previous,
                to = %current,
                "Presence transition"
            );
        }

        Ok(PresenceChange {
            device_id: device_id.to_string(),
            previous,
            current,
        })
    }

    /// Current status, from the cache when warm, otherwise from the store.
    pub async fn status(&self, device_id: &str) -> CoreResult<DeviceStatus> {
        let slot = self.slot(device_id).await;
        let mut cached = slot.lock().await;
        if let Some(record) = cached.as_ref() {
            return Ok(record.status);
        }
        let record = self.load(device_id).await?;
        let status = record.status;
        *cached = Some(record);
        Ok(status)
    }

    /// The cached record, without consulting the store.
    pub async fn cached(&self, device_id: &str) -> Option<PresenceRecord> {
        let slot = self.slots.read().await.get(device_id).cloned()?;
        let cached = slot.lock().await;
        cached.clone()
    }
}
