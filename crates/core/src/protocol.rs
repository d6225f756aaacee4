//! WebSocket wire protocol shared by devices and operator dashboards.
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": {...}}`. Field names inside `data` are
//! camelCase. Identifiers sent by clients may be JSON numbers or numeric
//! strings; both are accepted.

use serde::{Deserialize, Deserializer, Serialize};

use crate::command::{CommandStatus, CommandType};
use crate::customer::Customer;
use crate::types::DbId;

/// Reason attached to every emergency unlock push.
pub const EMERGENCY_UNLOCK_REASON: &str = "Customer service override";

/// Minutes an emergency unlock stays in effect on the device.
pub const EMERGENCY_UNLOCK_MINUTES: u32 = 30;

// ---------------------------------------------------------------------------
// Inbound (client -> server)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    #[serde(rename_all = "camelCase")]
    RegisterDevice {
        device_id: String,
        #[serde(deserialize_with = "flexible_id")]
        customer_id: DbId,
    },
    #[serde(rename_all = "camelCase")]
    RegisterAdmin {
        #[serde(deserialize_with = "flexible_string")]
        admin_id: String,
        #[serde(default)]
        admin_name: String,
    },
    #[serde(rename_all = "camelCase")]
    DeviceHeartbeat { device_id: String },
    CommandResult(ReportedResult),
}

impl InboundEvent {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The `event` name of a frame, even when its `data` does not decode.
    pub fn peek_name(text: &str) -> Option<String> {
        #[derive(Deserialize)]
        struct Envelope {
            event: String,
        }
        serde_json::from_str::<Envelope>(text).ok().map(|e| e.event)
    }

    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::RegisterDevice { .. } => "register_device",
            InboundEvent::RegisterAdmin { .. } => "register_admin",
            InboundEvent::DeviceHeartbeat { .. } => "device_heartbeat",
            InboundEvent::CommandResult(_) => "command_result",
        }
    }
}

/// A device's report of how a command went.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedResult {
    pub device_id: String,
    #[serde(deserialize_with = "flexible_id")]
    pub command_id: DbId,
    pub status: CommandStatus,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Outbound (server -> client)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    #[serde(rename_all = "camelCase")]
    RegistrationSuccess {
        device_id: String,
        customer_id: DbId,
        customer: Customer,
        status: &'static str,
    },
    RegistrationError { error: String },
    #[serde(rename_all = "camelCase")]
    AdminRegistrationSuccess {
        admin_id: String,
        admin_name: String,
        status: &'static str,
        customers: Vec<Customer>,
    },
    #[serde(rename_all = "camelCase")]
    DeviceCommand {
        command_id: DbId,
        command: CommandType,
        payload: serde_json::Value,
    },
    DeviceOnline(DeviceContext),
    DeviceOffline(DeviceContext),
    DeviceLocked(DeviceContext),
    DeviceUnlocked(DeviceContext),
    #[serde(rename_all = "camelCase")]
    CommandCompleted {
        device_id: String,
        command_id: DbId,
        command_type: Option<CommandType>,
        status: CommandStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
        customer_id: Option<DbId>,
        customer_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    PaymentReceived {
        #[serde(skip_serializing_if = "Option::is_none")]
        customer_id: Option<DbId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        customer_name: Option<String>,
        amount: i64,
        remaining_overdue: i64,
    },
    EmergencyUnlock { reason: &'static str, duration: u32 },
}

impl OutboundEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::RegistrationSuccess { .. } => "registration_success",
            OutboundEvent::RegistrationError { .. } => "registration_error",
            OutboundEvent::AdminRegistrationSuccess { .. } => "admin_registration_success",
            OutboundEvent::DeviceCommand { .. } => "device_command",
            OutboundEvent::DeviceOnline(_) => "device_online",
            OutboundEvent::DeviceOffline(_) => "device_offline",
            OutboundEvent::DeviceLocked(_) => "device_locked",
            OutboundEvent::DeviceUnlocked(_) => "device_unlocked",
            OutboundEvent::CommandCompleted { .. } => "command_completed",
            OutboundEvent::PaymentReceived { .. } => "payment_received",
            OutboundEvent::EmergencyUnlock { .. } => "emergency_unlock",
        }
    }

    pub fn emergency_unlock() -> Self {
        OutboundEvent::EmergencyUnlock {
            reason: EMERGENCY_UNLOCK_REASON,
            duration: EMERGENCY_UNLOCK_MINUTES,
        }
    }
}

/// Device plus owning customer, as shown in operator presence events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceContext {
    pub device_id: String,
    pub customer_id: Option<DbId>,
    pub customer_name: Option<String>,
}

impl DeviceContext {
    pub fn new(device_id: impl Into<String>, customer: Option<&Customer>) -> Self {
        Self {
            device_id: device_id.into(),
            customer_id: customer.map(|c| c.id),
            customer_name: customer.map(|c| c.name.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Lenient identifier decoding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Int(DbId),
    Text(String),
}

fn flexible_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DbId, D::Error> {
    match IdRepr::deserialize(deserializer)? {
        IdRepr::Int(id) => Ok(id),
        IdRepr::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid id '{text}'"))),
    }
}

fn flexible_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match IdRepr::deserialize(deserializer)? {
        IdRepr::Int(id) => Ok(id.to_string()),
        IdRepr::Text(text) => Ok(text),
    }
}
