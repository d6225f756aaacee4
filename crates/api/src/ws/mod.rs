//! WebSocket transport for device and operator connections.
//!
//! Provides the HTTP upgrade handler that binds each socket to the session
//! orchestrator, and the heartbeat pinger.

mod handler;
mod heartbeat;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
