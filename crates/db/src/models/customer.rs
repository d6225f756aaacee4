//! Customer rows joined with their loan.

use emisafe_core::customer::{Customer, Loan};
use emisafe_core::error::CoreError;
use emisafe_core::presence::DeviceStatus;
use emisafe_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A `customers` row LEFT JOINed with `loans`. Loan columns are `NULL` for
/// customers without a loan.
#[derive(Debug, Clone, FromRow)]
pub struct CustomerRow {
    pub id: DbId,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub device_id: String,
    pub device_status: String,
    pub last_seen: Option<Timestamp>,
    pub loan_id: Option<DbId>,
    pub loan_amount: Option<i64>,
    pub emi_amount: Option<i64>,
    pub tenure_months: Option<i32>,
    pub paid_emis: Option<i32>,
    pub overdue_amount: Option<i64>,
    pub overdue_days: Option<i32>,
    pub loan_status: Option<String>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = CoreError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        let device_status: DeviceStatus = row.device_status.parse().map_err(|e| {
            CoreError::Internal(format!("customer {}: {e}", row.id))
        })?;

        let loan = match (row.loan_id, row.loan_amount, row.emi_amount) {
            (Some(id), Some(amount), Some(emi_amount)) => Some(Loan {
                id,
                amount,
                emi_amount,
                tenure_months: row.tenure_months.unwrap_or_default(),
                paid_emis: row.paid_emis.unwrap_or_default(),
                overdue_amount: row.overdue_amount.unwrap_or_default(),
                overdue_days: row.overdue_days.unwrap_or_default(),
                status: row.loan_status.unwrap_or_else(|| "active".to_string()),
            }),
            _ => None,
        };

        Ok(Customer {
            id: row.id,
            name: row.name,
            phone: row.phone,
            email: row.email,
            address: row.address,
            device_id: row.device_id,
            device_status,
            last_seen: row.last_seen,
            loan,
        })
    }
}

/// DTO for inserting a customer.
pub struct CreateCustomer {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub device_id: String,
}

/// DTO for attaching a loan to a customer.
pub struct CreateLoan {
    pub customer_id: DbId,
    pub amount: i64,
    pub emi_amount: i64,
    pub tenure_months: i32,
    pub paid_emis: i32,
    pub overdue_amount: i64,
    pub overdue_days: i32,
}
