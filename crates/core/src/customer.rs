//! Customer, loan, and dashboard projections.
//!
//! Customers are owned by the external customer/loan store; the session
//! subsystem only reads them and writes back presence (`device_status`,
//! `last_seen`) and payment outcomes.

use serde::{Deserialize, Serialize};

use crate::presence::DeviceStatus;
use crate::types::{DbId, Timestamp};

/// A financed customer and the single device bound to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: DbId,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub device_id: String,
    pub device_status: DeviceStatus,
    pub last_seen: Option<Timestamp>,
    pub loan: Option<Loan>,
}

impl Customer {
    /// Outstanding overdue amount, zero when no loan is attached.
    pub fn overdue_amount(&self) -> i64 {
        self.loan.as_ref().map_or(0, |loan| loan.overdue_amount)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub id: DbId,
    pub amount: i64,
    pub emi_amount: i64,
    pub tenure_months: i32,
    #[serde(rename = "paidEMIs")]
    pub paid_emis: i32,
    pub overdue_amount: i64,
    pub overdue_days: i32,
    pub status: String,
}

/// Outcome of recording a payment against a customer's loan.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    pub customer: Customer,
    pub amount: i64,
    pub remaining_overdue: i64,
}

/// Aggregate counts shown on the operator dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_customers: usize,
    pub online_devices: usize,
    pub locked_devices: usize,
    /// Devices with a live registered connection right now.
    pub connected_devices: usize,
    pub commands_today: i64,
    pub total_overdue_amount: i64,
}

impl DashboardStats {
    /// Fold the customer snapshot into the status and overdue counters.
    pub fn from_customers(customers: &[Customer]) -> Self {
        let mut stats = DashboardStats {
            total_customers: customers.len(),
            ..Default::default()
        };
        for customer in customers {
            match customer.device_status {
                DeviceStatus::Online => stats.online_devices += 1,
                DeviceStatus::Locked => stats.locked_devices += 1,
                DeviceStatus::Offline => {}
            }
            stats.total_overdue_amount += customer.overdue_amount();
        }
        stats
    }
}
