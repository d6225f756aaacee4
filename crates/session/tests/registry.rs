//! Tests for `ConnectionRegistry`.
//!
//! Exercise registration, replacement, the connection-id guard on removal,
//! and the shutdown helpers directly, without any transport.

use emisafe_session::{ConnectionHandle, ConnectionRegistry, Outbound, Role};

// ---------------------------------------------------------------------------
// Test: new registry starts empty
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_registry_is_empty() {
    let registry = ConnectionRegistry::new();

    assert_eq!(registry.count(Role::Device).await, 0);
    assert_eq!(registry.count(Role::Operator).await, 0);
}

// ---------------------------------------------------------------------------
// Test: register() then lookup() returns the same connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lookup_returns_registered_handle() {
    let registry = ConnectionRegistry::new();
    let (handle, _rx) = ConnectionHandle::channel(8);
    let conn_id = handle.id();

    assert!(registry.register(Role::Device, "device_001", handle).await.is_none());

    let found = registry
        .lookup(Role::Device, "device_001")
        .await
        .expect("device should be registered");
    assert_eq!(found.id(), conn_id);
    assert_eq!(registry.count(Role::Device).await, 1);
}

// ---------------------------------------------------------------------------
// Test: re-registering an id replaces the entry (last writer wins)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reregistration_replaces_previous_connection() {
    let registry = ConnectionRegistry::new();
    let (old, _old_rx) = ConnectionHandle::channel(8);
    let (new, _new_rx) = ConnectionHandle::channel(8);
    let old_id = old.id();
    let new_id = new.id();

    registry.register(Role::Device, "device_001", old).await;
    let replaced = registry.register(Role::Device, "device_001", new).await;

    assert_eq!(replaced.map(|h| h.id()), Some(old_id));
    assert_eq!(registry.count(Role::Device).await, 1);
    assert_eq!(
        registry.lookup(Role::Device, "device_001").await.map(|h| h.id()),
        Some(new_id)
    );
}

// ---------------------------------------------------------------------------
// Test: registering the same connection twice is not reported as a replacement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn same_connection_reregistering_is_not_a_replacement() {
    let registry = ConnectionRegistry::new();
    let (handle, _rx) = ConnectionHandle::channel(8);

    registry.register(Role::Device, "device_001", handle.clone()).await;
    assert!(registry.register(Role::Device, "device_001", handle).await.is_none());
}

// ---------------------------------------------------------------------------
// Test: removal by a stale connection keeps the newer registration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stale_connection_cannot_remove_newer_entry() {
    let registry = ConnectionRegistry::new();
    let (old, _old_rx) = ConnectionHandle::channel(8);
    let (new, _new_rx) = ConnectionHandle::channel(8);
    let old_id = old.id();
    let new_id = new.id();

    registry.register(Role::Device, "device_001", old).await;
    registry.register(Role::Device, "device_001", new).await;

    assert!(!registry.remove(Role::Device, "device_001", old_id).await);
    assert!(registry.remove_connection(old_id).await.is_empty());
    assert_eq!(
        registry.lookup(Role::Device, "device_001").await.map(|h| h.id()),
        Some(new_id)
    );

    assert!(registry.remove(Role::Device, "device_001", new_id).await);
    assert!(registry.lookup(Role::Device, "device_001").await.is_none());
}

// ---------------------------------------------------------------------------
// Test: remove_connection() reports every entry owned by the connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn remove_connection_clears_all_roles() {
    let registry = ConnectionRegistry::new();
    let (shared, _rx) = ConnectionHandle::channel(8);
    let (other, _other_rx) = ConnectionHandle::channel(8);
    let shared_id = shared.id();

    registry.register(Role::Device, "device_001", shared.clone()).await;
    registry.register(Role::Operator, "admin-1", shared).await;
    registry.register(Role::Operator, "admin-2", other).await;

    let mut removed = registry.remove_connection(shared_id).await;
    removed.sort_by(|a, b| a.1.cmp(&b.1));

    assert_eq!(
        removed,
        vec![
            (Role::Operator, "admin-1".to_string()),
            (Role::Device, "device_001".to_string()),
        ]
    );
    assert_eq!(registry.count(Role::Device).await, 0);
    assert_eq!(registry.count(Role::Operator).await, 1);
}

// ---------------------------------------------------------------------------
// Test: touch() only updates registered devices
// ---------------------------------------------------------------------------

#[tokio::test]
async fn touch_updates_last_seen_for_registered_devices() {
    let registry = ConnectionRegistry::new();
    let (handle, _rx) = ConnectionHandle::channel(8);
    registry.register(Role::Device, "device_001", handle).await;
    let before = registry
        .entry(Role::Device, "device_001")
        .await
        .unwrap()
        .last_seen;

    let touched = registry.touch("device_001").await.expect("registered");

    assert!(touched >= before);
    assert!(registry.touch("device_404").await.is_none());
}

// ---------------------------------------------------------------------------
// Test: close_all() sends Close to everyone and clears the registry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn close_all_sends_close_and_clears() {
    let registry = ConnectionRegistry::new();
    let (device, mut device_rx) = ConnectionHandle::channel(8);
    let (admin, mut admin_rx) = ConnectionHandle::channel(8);
    registry.register(Role::Device, "device_001", device).await;
    registry.register(Role::Operator, "admin-1", admin).await;

    assert_eq!(registry.close_all().await, 2);

    assert_eq!(registry.count(Role::Device).await, 0);
    assert_eq!(registry.count(Role::Operator).await, 0);
    assert_eq!(device_rx.recv().await, Some(Outbound::Close));
    assert_eq!(admin_rx.recv().await, Some(Outbound::Close));
}

// ---------------------------------------------------------------------------
// Test: ping_all() skips closed channels without panicking
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_all_skips_closed_channels() {
    let registry = ConnectionRegistry::new();
    let (gone, gone_rx) = ConnectionHandle::channel(8);
    let (alive, mut alive_rx) = ConnectionHandle::channel(8);
    registry.register(Role::Device, "device_001", gone).await;
    registry.register(Role::Operator, "admin-1", alive).await;
    drop(gone_rx);

    registry.ping_all().await;

    assert_eq!(alive_rx.recv().await, Some(Outbound::Ping));
}
