#![allow(dead_code)]

use std::sync::Arc;

use emisafe_core::store::InMemoryStore;
use emisafe_session::{ConnectionHandle, Outbound, SessionOrchestrator};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// Orchestrator wired to a fresh demo-fleet in-memory store.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub orchestrator: SessionOrchestrator,
}

pub fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::with_demo_fleet());
    let orchestrator = SessionOrchestrator::new(store.clone(), store.clone());
    Harness {
        store,
        orchestrator,
    }
}

/// A connection backed by a plain channel instead of a socket.
pub struct TestConn {
    pub handle: ConnectionHandle,
    pub rx: mpsc::Receiver<Outbound>,
}

pub fn connect() -> TestConn {
    let (handle, rx) = ConnectionHandle::channel(64);
    TestConn { handle, rx }
}

impl TestConn {
    /// Pop the next queued event frame, panicking if there is none.
    pub fn next_event(&mut self) -> Value {
        match self.rx.try_recv() {
            Ok(Outbound::Text(text)) => serde_json::from_str(&text).expect("frame is JSON"),
            other => panic!("expected a queued event frame, got {other:?}"),
        }
    }

    /// Pop every queued event frame.
    pub fn drain(&mut self) -> Vec<Value> {
        let mut events = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            if let Outbound::Text(text) = message {
                events.push(serde_json::from_str(&text).expect("frame is JSON"));
            }
        }
        events
    }

    pub fn assert_silent(&mut self) {
        let pending = self.drain();
        assert!(pending.is_empty(), "expected no frames, got {pending:?}");
    }
}

pub fn frame(event: &str, data: Value) -> String {
    json!({ "event": event, "data": data }).to_string()
}

pub async fn register_device(h: &Harness, conn: &TestConn, device_id: &str, customer_id: i64) {
    h.orchestrator
        .handle_frame(
            &conn.handle,
            &frame(
                "register_device",
                json!({ "deviceId": device_id, "customerId": customer_id }),
            ),
        )
        .await;
}

pub async fn register_admin(h: &Harness, conn: &TestConn, admin_id: &str) {
    h.orchestrator
        .handle_frame(
            &conn.handle,
            &frame(
                "register_admin",
                json!({ "adminId": admin_id, "adminName": "Ops Desk" }),
            ),
        )
        .await;
}

pub async fn report(h: &Harness, conn: &TestConn, data: Value) {
    h.orchestrator
        .handle_frame(&conn.handle, &frame("command_result", data))
        .await;
}

/// Names of the given event frames, in order.
pub fn names(events: &[Value]) -> Vec<String> {
    events
        .iter()
        .map(|e| e["event"].as_str().unwrap_or_default().to_string())
        .collect()
}
