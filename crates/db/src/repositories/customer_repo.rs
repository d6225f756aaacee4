//! Repository for the `customers` and `loans` tables.

use emisafe_core::presence::DeviceStatus;
use emisafe_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::customer::{CreateCustomer, CreateLoan, CustomerRow};

/// Column list for a customer joined with its loan.
const COLUMNS: &str = "c.id, c.name, c.phone, c.email, c.address, c.device_id, \
                        c.device_status, c.last_seen, \
                        l.id AS loan_id, l.amount AS loan_amount, l.emi_amount, \
                        l.tenure_months, l.paid_emis, l.overdue_amount, \
                        l.overdue_days, l.status AS loan_status";

const FROM: &str = "customers c LEFT JOIN loans l ON l.customer_id = c.id";

/// Reads customers and writes back presence and payment outcomes.
pub struct CustomerRepo;

impl CustomerRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<CustomerRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM {FROM} WHERE c.id = $1");
        sqlx::query_as::<_, CustomerRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find the customer a device is bound to.
    pub async fn find_by_device_id(
        pool: &PgPool,
        device_id: &str,
    ) -> Result<Option<CustomerRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM {FROM} WHERE c.device_id = $1");
        sqlx::query_as::<_, CustomerRow>(&query)
            .bind(device_id)
            .fetch_optional(pool)
            .await
    }

    /// All customers ordered by id.
    pub async fn list(pool: &PgPool) -> Result<Vec<CustomerRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM {FROM} ORDER BY c.id");
        sqlx::query_as::<_, CustomerRow>(&query)
            .fetch_all(pool)
            .await
    }

    /// Persist a device's presence status. Returns `true` if a row was updated.
    pub async fn update_device_status(
        pool: &PgPool,
        device_id: &str,
        status: DeviceStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE customers SET device_status = $2, updated_at = NOW() WHERE device_id = $1",
        )
        .bind(device_id)
        .bind(status.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn touch_last_seen(
        pool: &PgPool,
        device_id: &str,
        at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE customers SET last_seen = $2 WHERE device_id = $1")
            .bind(device_id)
            .bind(at)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Apply a payment to the customer's loan in a single statement.
    ///
    /// `amount` of `None` pays one EMI. Overdue never drops below zero and
    /// overdue days reset once it reaches zero. Returns the amount applied
    /// and the remaining overdue, or `None` if the customer has no loan.
    pub async fn apply_payment(
        pool: &PgPool,
        customer_id: DbId,
        amount: Option<i64>,
    ) -> Result<Option<(i64, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (i64, i64)>(
            "UPDATE loans
             SET overdue_amount = GREATEST(overdue_amount - COALESCE($2, emi_amount), 0),
                 overdue_days = CASE
                     WHEN overdue_amount - COALESCE($2, emi_amount) <= 0 THEN 0
                     ELSE overdue_days
                 END,
                 paid_emis = paid_emis + 1,
                 updated_at = NOW()
             WHERE customer_id = $1
             RETURNING COALESCE($2, emi_amount), overdue_amount",
        )
        .bind(customer_id)
        .bind(amount)
        .fetch_optional(pool)
        .await
    }

    /// Insert a customer, returning its id.
    pub async fn create(pool: &PgPool, input: &CreateCustomer) -> Result<DbId, sqlx::Error> {
        let row: (DbId,) = sqlx::query_as(
            "INSERT INTO customers (name, phone, email, address, device_id)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(&input.name)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.address)
        .bind(&input.device_id)
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }

    /// Attach a loan to a customer, returning the loan id.
    pub async fn create_loan(pool: &PgPool, input: &CreateLoan) -> Result<DbId, sqlx::Error> {
        let row: (DbId,) = sqlx::query_as(
            "INSERT INTO loans
                 (customer_id, amount, emi_amount, tenure_months, paid_emis, overdue_amount, overdue_days)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id",
        )
        .bind(input.customer_id)
        .bind(input.amount)
        .bind(input.emi_amount)
        .bind(input.tenure_months)
        .bind(input.paid_emis)
        .bind(input.overdue_amount)
        .bind(input.overdue_days)
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }
}
