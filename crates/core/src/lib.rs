//! Domain model for the EMI Safe device fleet.
//!
//! Holds everything the session subsystem and the storage backends agree
//! on: identifiers, the error taxonomy, the presence state machine, the
//! command lifecycle, the customer/loan records, the WebSocket wire
//! protocol, and the narrow store traits (plus an in-memory store).

pub mod command;
pub mod customer;
pub mod error;
pub mod presence;
pub mod protocol;
pub mod store;
pub mod types;
