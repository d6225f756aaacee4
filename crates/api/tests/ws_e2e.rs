//! End-to-end WebSocket test over a real socket.
//!
//! Binds the full router on an ephemeral port and drives a device and an
//! operator through registration, a lock command, and disconnect.

mod common;

use std::time::Duration;

use emisafe_core::command::CommandType;
use emisafe_core::presence::DeviceStatus;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> (String, common::TestApp) {
    let app = common::build_test_app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("ws://{addr}/api/v1/ws"), app)
}

async fn send(client: &mut Client, event: &str, data: Value) {
    let text = json!({ "event": event, "data": data }).to_string();
    client.send(Message::Text(text)).await.unwrap();
}

/// Next JSON event frame, skipping control frames.
async fn next_event(client: &mut Client) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Poll until `check` holds, failing after a few seconds.
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

// ---------------------------------------------------------------------------
// Test: device and operator over real sockets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lock_round_trip_over_websocket() {
    let (url, app) = spawn_server().await;

    let (mut admin, _) = connect_async(url.as_str()).await.unwrap();
    send(
        &mut admin,
        "register_admin",
        json!({ "adminId": "admin-1", "adminName": "Ops Desk" }),
    )
    .await;
    let snapshot = next_event(&mut admin).await;
    assert_eq!(snapshot["event"], "admin_registration_success");
    assert_eq!(snapshot["data"]["customers"].as_array().unwrap().len(), 3);

    let (mut device, _) = connect_async(url.as_str()).await.unwrap();
    send(
        &mut device,
        "register_device",
        json!({ "deviceId": "device_001", "customerId": "1" }),
    )
    .await;
    let reply = next_event(&mut device).await;
    assert_eq!(reply["event"], "registration_success");
    assert_eq!(next_event(&mut admin).await["event"], "device_online");

    let command = app
        .orchestrator
        .dispatcher()
        .issue_command("device_001", CommandType::LockDevice, json!({}))
        .await
        .unwrap();
    let pushed = next_event(&mut device).await;
    assert_eq!(pushed["event"], "device_command");
    assert_eq!(pushed["data"]["commandId"], command.id);

    send(
        &mut device,
        "command_result",
        json!({ "deviceId": "device_001", "commandId": command.id, "status": "success" }),
    )
    .await;
    assert_eq!(next_event(&mut admin).await["event"], "device_locked");
    let completed = next_event(&mut admin).await;
    assert_eq!(completed["event"], "command_completed");
    assert_eq!(completed["data"]["status"], "success");

    device.close(None).await.unwrap();
    assert_eq!(next_event(&mut admin).await["event"], "device_offline");

    let orchestrator = app.orchestrator.clone();
    eventually(|| {
        let orchestrator = orchestrator.clone();
        async move {
            orchestrator
                .registry()
                .lookup(emisafe_session::Role::Device, "device_001")
                .await
                .is_none()
        }
    })
    .await;
    assert_eq!(
        app.orchestrator.presence().status("device_001").await.unwrap(),
        DeviceStatus::Locked
    );
}

// ---------------------------------------------------------------------------
// Test: malformed frames do not close the connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_frame_keeps_connection_open() {
    let (url, _app) = spawn_server().await;
    let (mut client, _) = connect_async(url.as_str()).await.unwrap();

    client
        .send(Message::Text("{not json".to_string()))
        .await
        .unwrap();
    send(
        &mut client,
        "register_device",
        json!({ "deviceId": "device_404", "customerId": 1 }),
    )
    .await;

    let reply = next_event(&mut client).await;
    assert_eq!(reply["event"], "registration_error");
    assert_eq!(reply["data"]["error"], "Invalid device or customer");
}

// ---------------------------------------------------------------------------
// Test: shutdown sends Close to every registered connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_closes_registered_sockets() {
    let (url, app) = spawn_server().await;
    let (mut device, _) = connect_async(url.as_str()).await.unwrap();
    send(
        &mut device,
        "register_device",
        json!({ "deviceId": "device_002", "customerId": 2 }),
    )
    .await;
    assert_eq!(next_event(&mut device).await["event"], "registration_success");

    app.orchestrator.shutdown().await;

    let message = tokio::time::timeout(Duration::from_secs(5), device.next())
        .await
        .expect("timed out waiting for close");
    assert!(matches!(message, Some(Ok(Message::Close(_))) | None));
}

#[tokio::test]
async fn shutdown_closes_sockets_that_never_registered() {
    let (url, app) = spawn_server().await;
    let (mut idle, _) = connect_async(url.as_str()).await.unwrap();

    let orchestrator = app.orchestrator.clone();
    eventually(|| {
        let orchestrator = orchestrator.clone();
        async move { orchestrator.registry().connection_count().await == 1 }
    })
    .await;

    app.orchestrator.shutdown().await;

    let message = tokio::time::timeout(Duration::from_secs(5), idle.next())
        .await
        .expect("timed out waiting for close");
    assert!(matches!(message, Some(Ok(Message::Close(_))) | None));
}
