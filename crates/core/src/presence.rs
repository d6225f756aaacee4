//! Device presence state machine.
//!
//! ```text
//!            register / heartbeat
//!   offline ----------------------> online
//!      ^                            |    ^
//!      |       disconnect           |    | unlock success /
//!      +----------------------------+    | emergency unlock
//!                                   v    |
//!                     lock success  locked  (disconnect: stays locked)
//! ```
//!
//! Lock state reflects loan policy, not reachability, so a locked device
//! stays locked across disconnects and re-registrations. There is no edge
//! from `offline` straight to `locked`: a lock can only be executed by a
//! device that is connected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Cached reachability/lock status of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    #[default]
    Offline,
    Locked,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
            DeviceStatus::Locked => "locked",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(DeviceStatus::Online),
            "offline" => Ok(DeviceStatus::Offline),
            "locked" => Ok(DeviceStatus::Locked),
            other => Err(format!("unknown device status '{other}'")),
        }
    }
}

/// Everything that can move a device between presence states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEvent {
    /// The device completed `register_device` on a live connection.
    Registered,
    /// A heartbeat arrived from a registered device.
    Heartbeat,
    /// A `LOCK_DEVICE` command was reported `success`.
    LockSucceeded,
    /// An `UNLOCK_DEVICE` command was reported `success`.
    UnlockSucceeded,
    /// The device's live connection closed.
    Disconnected,
    /// Administrative override that bypasses the command flow.
    EmergencyUnlock,
}

impl PresenceEvent {
    /// Whether this event proves the device is reachable right now.
    pub fn is_contact(&self) -> bool {
        matches!(self, PresenceEvent::Registered | PresenceEvent::Heartbeat)
    }
}

/// Resulting status for `event` applied in `current`.
///
/// Total over every (state, event) pair; pairs without a meaningful edge
/// are self-transitions.
pub fn transition(current: DeviceStatus, event: PresenceEvent) -> DeviceStatus {
    use DeviceStatus::*;
    use PresenceEvent::*;

    match (current, event) {
        (Offline, Registered | Heartbeat) => Online,
        (Online, Registered | Heartbeat) => Online,
        (Locked, Registered | Heartbeat) => Locked,

        (Online, LockSucceeded) => Locked,
        (Locked, LockSucceeded) => Locked,
        (Offline, LockSucceeded) => Offline,

        (Locked, UnlockSucceeded | EmergencyUnlock) => Online,
        (Online, UnlockSucceeded | EmergencyUnlock) => Online,
        (Offline, UnlockSucceeded | EmergencyUnlock) => Offline,

        (Online, Disconnected) => Offline,
        (Locked, Disconnected) => Locked,
        (Offline, Disconnected) => Offline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATES: [DeviceStatus; 3] = [
        DeviceStatus::Offline,
        DeviceStatus::Online,
        DeviceStatus::Locked,
    ];

    const EVENTS: [PresenceEvent; 6] = [
        PresenceEvent::Registered,
        PresenceEvent::Heartbeat,
        PresenceEvent::LockSucceeded,
        PresenceEvent::UnlockSucceeded,
        PresenceEvent::Disconnected,
        PresenceEvent::EmergencyUnlock,
    ];

    #[test]
    fn disconnect_keeps_locked_devices_locked() {
        assert_eq!(
            transition(DeviceStatus::Locked, PresenceEvent::Disconnected),
            DeviceStatus::Locked
        );
        assert_eq!(
            transition(DeviceStatus::Online, PresenceEvent::Disconnected),
            DeviceStatus::Offline
        );
    }

    #[test]
    fn offline_never_jumps_to_locked() {
        for event in EVENTS {
            assert_ne!(
                transition(DeviceStatus::Offline, event),
                DeviceStatus::Locked,
                "offline --{event:?}--> locked must not exist"
            );
        }
    }

    #[test]
    fn reregistering_a_locked_device_keeps_the_lock() {
        assert_eq!(
            transition(DeviceStatus::Locked, PresenceEvent::Registered),
            DeviceStatus::Locked
        );
    }

    #[test]
    fn lock_then_unlock_round_trips_through_locked() {
        let locked = transition(DeviceStatus::Online, PresenceEvent::LockSucceeded);
        assert_eq!(locked, DeviceStatus::Locked);
        assert_eq!(
            transition(locked, PresenceEvent::UnlockSucceeded),
            DeviceStatus::Online
        );
        assert_eq!(
            transition(locked, PresenceEvent::EmergencyUnlock),
            DeviceStatus::Online
        );
    }

    #[test]
    fn repeated_events_are_idempotent() {
        for state in STATES {
            for event in EVENTS {
                let once = transition(state, event);
                assert_eq!(transition(once, event), once, "{state:?} + {event:?} twice");
            }
        }
    }

    #[test]
    fn status_parses_its_own_string_form() {
        for state in STATES {
            assert_eq!(state.as_str().parse::<DeviceStatus>(), Ok(state));
        }
        assert!("rebooting".parse::<DeviceStatus>().is_err());
    }
}
