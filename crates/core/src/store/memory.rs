use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CommandStore, DeviceStore};
use crate::command::{CommandCompletion, CommandStatus, DeviceCommand, NewCommand};
use crate::customer::{Customer, Loan, PaymentReceipt};
use crate::error::{CoreError, CoreResult};
use crate::presence::DeviceStatus;
use crate::types::{DbId, Timestamp};

/// Process-local store implementing both store traits.
///
/// Used when no database is configured and as the fake behind the session
/// and API test suites. Command ids are assigned from a counter starting at 1.
pub struct InMemoryStore {
    customers: RwLock<Vec<Customer>>,
    commands: RwLock<Vec<DeviceCommand>>,
    next_command_id: AtomicI64,
    completion_failing: AtomicBool,
}

impl InMemoryStore {
    pub fn new(customers: Vec<Customer>) -> Self {
        Self {
            customers: RwLock::new(customers),
            commands: RwLock::new(Vec::new()),
            next_command_id: AtomicI64::new(1),
            completion_failing: AtomicBool::new(false),
        }
    }

    /// Store seeded with the three demo customers used in local development.
    pub fn with_demo_fleet() -> Self {
        Self::new(demo_fleet())
    }

    /// Make every subsequent `complete_command` call fail with
    /// [`CoreError::Internal`] until switched back off.
    pub fn set_completion_failing(&self, failing: bool) {
        self.completion_failing.store(failing, Ordering::SeqCst);
    }

    /// All stored commands in insertion order.
    pub async fn commands(&self) -> Vec<DeviceCommand> {
        self.commands.read().await.clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::with_demo_fleet()
    }
}

#[async_trait]
impl DeviceStore for InMemoryStore {
    async fn find_device_customer(&self, device_id: &str) -> CoreResult<Option<Customer>> {
        let customers = self.customers.read().await;
        Ok(customers.iter().find(|c| c.device_id == device_id).cloned())
    }

    async fn find_customer(&self, customer_id: DbId) -> CoreResult<Option<Customer>> {
        let customers = self.customers.read().await;
        Ok(customers.iter().find(|c| c.id == customer_id).cloned())
    }

    async fn list_customers(&self) -> CoreResult<Vec<Customer>> {
        let mut customers = self.customers.read().await.clone();
        customers.sort_by_key(|c| c.id);
        Ok(customers)
    }

    async fn set_device_status(&self, device_id: &str, status: DeviceStatus) -> CoreResult<bool> {
        let mut customers = self.customers.write().await;
        match customers.iter_mut().find(|c| c.device_id == device_id) {
            Some(customer) => {
                customer.device_status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_last_seen(&self, device_id: &str, at: Timestamp) -> CoreResult<bool> {
        let mut customers = self.customers.write().await;
        match customers.iter_mut().find(|c| c.device_id == device_id) {
            Some(customer) => {
                customer.last_seen = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_payment(
        &self,
        customer_id: DbId,
        amount: Option<i64>,
    ) -> CoreResult<Option<PaymentReceipt>> {
        let mut customers = self.customers.write().await;
        let Some(customer) = customers.iter_mut().find(|c| c.id == customer_id) else {
            return Ok(None);
        };
        let Some(loan) = customer.loan.as_mut() else {
            return Ok(None);
        };

        let paid = amount.unwrap_or(loan.emi_amount);
        loan.overdue_amount = (loan.overdue_amount - paid).max(0);
        loan.paid_emis += 1;
        if loan.overdue_amount == 0 {
            loan.overdue_days = 0;
        }
        let remaining_overdue = loan.overdue_amount;

        Ok(Some(PaymentReceipt {
            customer: customer.clone(),
            amount: paid,
            remaining_overdue,
        }))
    }

    async fn health_check(&self) -> CoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl CommandStore for InMemoryStore {
    async fn insert_command(&self, command: &NewCommand) -> CoreResult<DeviceCommand> {
        let record = DeviceCommand {
            id: self.next_command_id.fetch_add(1, Ordering::SeqCst),
            customer_id: command.customer_id,
            device_id: command.device_id.clone(),
            command_type: command.command_type.clone(),
            payload: command.payload.clone(),
            status: CommandStatus::Pending,
            created_at: chrono::Utc::now(),
            completed_at: None,
            result: None,
            error: None,
        };
        self.commands.write().await.push(record.clone());
        Ok(record)
    }

    async fn find_command(&self, command_id: DbId) -> CoreResult<Option<DeviceCommand>> {
        let commands = self.commands.read().await;
        Ok(commands.iter().find(|c| c.id == command_id).cloned())
    }

    async fn complete_command(
        &self,
        command_id: DbId,
        completion: &CommandCompletion,
    ) -> CoreResult<Option<DeviceCommand>> {
        if self.completion_failing.load(Ordering::SeqCst) {
            return Err(CoreError::Internal(
                "command store unavailable".to_string(),
            ));
        }

        let mut commands = self.commands.write().await;
        let Some(command) = commands
            .iter_mut()
            .find(|c| c.id == command_id && c.status == CommandStatus::Pending)
        else {
            return Ok(None);
        };

        command.status = completion.status;
        command.result = completion.result.clone();
        command.error = completion.error.clone();
        command.completed_at = Some(completion.completed_at);
        Ok(Some(command.clone()))
    }

    async fn list_device_commands(
        &self,
        device_id: &str,
        limit: i64,
    ) -> CoreResult<Vec<DeviceCommand>> {
        let commands = self.commands.read().await;
        let mut matching: Vec<DeviceCommand> = commands
            .iter()
            .filter(|c| c.device_id == device_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        matching.truncate(usize::try_from(limit.max(0)).unwrap_or(0));
        Ok(matching)
    }

    async fn count_commands_since(&self, since: Timestamp) -> CoreResult<i64> {
        let commands = self.commands.read().await;
        let count = commands.iter().filter(|c| c.created_at >= since).count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }
}

fn demo_fleet() -> Vec<Customer> {
    let loan = |id: DbId, amount, emi_amount, paid_emis, overdue_amount, overdue_days| Loan {
        id,
        amount,
        emi_amount,
        tenure_months: 12,
        paid_emis,
        overdue_amount,
        overdue_days,
        status: "active".to_string(),
    };

    vec![
        Customer {
            id: 1,
            name: "Rajesh Kumar".to_string(),
            phone: "9876543210".to_string(),
            email: Some("rajesh@example.com".to_string()),
            address: Some("Jaipur, Rajasthan".to_string()),
            device_id: "device_001".to_string(),
            device_status: DeviceStatus::Offline,
            last_seen: None,
            loan: Some(loan(1, 50_000, 4_500, 3, 9_000, 15)),
        },
        Customer {
            id: 2,
            name: "Priya Sharma".to_string(),
            phone: "9876543211".to_string(),
            email: Some("priya@example.com".to_string()),
            address: Some("Delhi, India".to_string()),
            device_id: "device_002".to_string(),
            device_status: DeviceStatus::Offline,
            last_seen: None,
            loan: Some(loan(2, 75_000, 6_800, 2, 13_600, 8)),
        },
        Customer {
            id: 3,
            name: "Amit Singh".to_string(),
            phone: "9876543212".to_string(),
            email: Some("amit@example.com".to_string()),
            address: Some("Mumbai, Maharashtra".to_string()),
            device_id: "device_003".to_string(),
            device_status: DeviceStatus::Locked,
            last_seen: Some(chrono::Utc::now() - chrono::Duration::minutes(5)),
            loan: Some(loan(3, 100_000, 9_000, 1, 27_000, 25)),
        },
    ]
}
