//! Device command records and their lifecycle.
//!
//! A command starts `pending` and moves exactly once to `success` or
//! `failed`. Records are never deleted; the command table is the audit
//! trail of everything operators asked devices to do.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{DbId, Timestamp};

/// Error text recorded when a command targets a device with no live session.
pub const DEVICE_NOT_CONNECTED: &str = "Device not connected";

/// Default number of entries returned by command history queries.
pub const DEFAULT_HISTORY_LIMIT: i64 = 20;

/// Upper bound on command history page size.
pub const MAX_HISTORY_LIMIT: i64 = 100;

/// Clamp a caller-supplied history limit into `1..=MAX_HISTORY_LIMIT`.
pub fn clamp_history_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

// ---------------------------------------------------------------------------
// CommandType
// ---------------------------------------------------------------------------

/// Kind of action requested from a device.
///
/// Serialized as the upper snake case wire name (`LOCK_DEVICE`). Device
/// clients may support actions this server does not interpret; those are
/// carried through as [`CommandType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandType {
    LockDevice,
    UnlockDevice,
    Other(String),
}

impl CommandType {
    pub fn as_str(&self) -> &str {
        match self {
            CommandType::LockDevice => "LOCK_DEVICE",
            CommandType::UnlockDevice => "UNLOCK_DEVICE",
            CommandType::Other(name) => name,
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.is_empty() {
            return Err("command type must not be empty".to_string());
        }
        Ok(match name {
            "LOCK_DEVICE" => CommandType::LockDevice,
            "UNLOCK_DEVICE" => CommandType::UnlockDevice,
            other => CommandType::Other(other.to_string()),
        })
    }
}

impl Serialize for CommandType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CommandType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// CommandStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Success,
    Failed,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Success => "success",
            CommandStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommandStatus::Pending)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CommandStatus::Pending),
            "success" => Ok(CommandStatus::Success),
            "failed" => Ok(CommandStatus::Failed),
            other => Err(format!("unknown command status '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A persisted command and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCommand {
    pub id: DbId,
    pub customer_id: DbId,
    pub device_id: String,
    pub command_type: CommandType,
    pub payload: serde_json::Value,
    pub status: CommandStatus,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Input for inserting a new `pending` command.
#[derive(Debug, Clone)]
pub struct NewCommand {
    pub customer_id: DbId,
    pub device_id: String,
    pub command_type: CommandType,
    pub payload: serde_json::Value,
}

/// Terminal outcome written onto a pending command.
#[derive(Debug, Clone)]
pub struct CommandCompletion {
    pub status: CommandStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub completed_at: Timestamp,
}

impl CommandCompletion {
    /// Dispatch-time failure for a device without a live connection.
    pub fn not_connected(completed_at: Timestamp) -> Self {
        Self {
            status: CommandStatus::Failed,
            result: None,
            error: Some(DEVICE_NOT_CONNECTED.to_string()),
            completed_at,
        }
    }
}
