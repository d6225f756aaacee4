//! Device session and command dispatch.
//!
//! - [`ConnectionRegistry`]: live device and operator connections.
//! - [`PresenceTracker`]: cached `online`/`offline`/`locked` status,
//!   written through to the device store.
//! - [`CommandDispatcher`]: command creation, delivery, and result handling.
//! - [`EventBroadcaster`]: best-effort fan-out to every operator.
//! - [`SessionOrchestrator`]: entry point for inbound connection events and
//!   administrative overrides.

pub mod broadcaster;
pub mod dispatcher;
pub mod orchestrator;
pub mod presence;
pub mod registry;

pub use broadcaster::EventBroadcaster;
pub use dispatcher::CommandDispatcher;
pub use orchestrator::{EmergencyUnlockOutcome, PaymentOutcome, SessionOrchestrator};
pub use presence::{PresenceChange, PresenceRecord, PresenceTracker};
pub use registry::{
    ConnectionEntry, ConnectionHandle, ConnectionId, ConnectionRegistry, Outbound, PushError, Role,
};
