use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use emisafe_session::{ConnectionHandle, Outbound};
use futures::{SinkExt, StreamExt};

use crate::state::AppState;

/// HTTP handler that upgrades the connection to WebSocket.
///
/// After the upgrade the socket is served by two tasks: a sender draining
/// the connection's outbound queue and the receive loop feeding inbound
/// frames to the orchestrator one at a time.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Creates the connection's outbound queue and handle and attaches it.
///   2. Spawns a sender task that forwards queued frames to the sink.
///   3. Hands each inbound text frame to the orchestrator, in order.
///   4. Tears down the connection's registrations on disconnect.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (handle, mut rx) = ConnectionHandle::channel(state.config.outbound_buffer);
    let conn_id = handle.id();
    state.orchestrator.on_connect(&handle).await;
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward queued frames to the WebSocket sink.
    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let (message, last) = match outbound {
                Outbound::Text(text) => (Message::Text(text.as_ref().into()), false),
                Outbound::Ping => (Message::Ping(Default::default()), false),
                Outbound::Close => (Message::Close(None), true),
            };
            if sink.send(message).await.is_err() {
                tracing::debug!(conn_id = %conn_id, "WebSocket sink closed");
                break;
            }
            if last {
                break;
            }
        }
    });

    // Receiver loop: frames from one connection are handled sequentially.
    loop {
        tokio::select! {
            received = stream.next() => match received {
                Some(Ok(Message::Text(text))) => {
                    state.orchestrator.handle_frame(&handle, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Pong(_))) => {
                    tracing::trace!(conn_id = %conn_id, "Pong received");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            },
            // The server closed the connection (shutdown) or the sink failed.
            _ = &mut send_task => break,
        }
    }

    // Clean up: drop this connection's registrations and stop the sender.
    state.orchestrator.on_disconnect(conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}
