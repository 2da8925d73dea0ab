//! Payment step: records the charge for a purchase.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{PurchaseId, UserId};
use domain::{Money, Purchase, SagaStep};
use serde::Serialize;
use tokio::sync::RwLock;

use super::{Participant, StepOutcome};
use crate::{Result, SagaError};

/// A stored payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub purchase_id: PurchaseId,
    pub user_id: UserId,
    pub currency_code: String,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    fn from_purchase(purchase: &Purchase) -> Self {
        Self {
            purchase_id: purchase.id,
            user_id: purchase.user_id(),
            currency_code: purchase.payment.currency_code.clone(),
            amount: purchase.payment.amount,
            created_at: Utc::now(),
        }
    }
}

/// Storage for payments, keyed on purchase id.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Stores the payment. Storing the same purchase again is a no-op, and a
    /// purchase whose payment was voided is never charged again.
    async fn create_payment(&self, payment: PaymentRecord) -> Result<StepOutcome>;

    /// Deletes the payment, remembers the void and returns whether the
    /// payment existed.
    async fn delete_payment(&self, purchase_id: PurchaseId) -> Result<bool>;

    /// Loads a payment.
    async fn get_payment(&self, purchase_id: PurchaseId) -> Result<Option<PaymentRecord>>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    payments: HashMap<PurchaseId, PaymentRecord>,
    voided: HashSet<PurchaseId>,
    fail_on_create: bool,
    fail_on_delete: bool,
}

/// In-memory payment repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentRepository {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent creates fail, as a declined charge would.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    /// Makes subsequent deletes fail.
    pub async fn set_fail_on_delete(&self, fail: bool) {
        self.state.write().await.fail_on_delete = fail;
    }

    /// Returns the number of stored payments.
    pub async fn payment_count(&self) -> usize {
        self.state.read().await.payments.len()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn create_payment(&self, payment: PaymentRecord) -> Result<StepOutcome> {
        let mut state = self.state.write().await;
        if state.fail_on_create {
            return Err(SagaError::StepFailed {
                step: SagaStep::CreatePayment,
                reason: "payment declined".into(),
            });
        }
        if state.voided.contains(&payment.purchase_id) {
            return Ok(StepOutcome::Compensated);
        }
        state.payments.entry(payment.purchase_id).or_insert(payment);
        Ok(StepOutcome::Applied)
    }

    async fn delete_payment(&self, purchase_id: PurchaseId) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.fail_on_delete {
            return Err(SagaError::CompensationFailed {
                step: SagaStep::CreatePayment,
                reason: "payment could not be voided".into(),
            });
        }
        state.voided.insert(purchase_id);
        Ok(state.payments.remove(&purchase_id).is_some())
    }

    async fn get_payment(&self, purchase_id: PurchaseId) -> Result<Option<PaymentRecord>> {
        Ok(self.state.read().await.payments.get(&purchase_id).cloned())
    }
}

/// Records the payment and voids it on compensation.
pub struct PaymentParticipant<R: PaymentRepository> {
    repository: R,
}

impl<R: PaymentRepository> PaymentParticipant<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl<R: PaymentRepository> Participant for PaymentParticipant<R> {
    fn step(&self) -> SagaStep {
        SagaStep::CreatePayment
    }

    async fn execute(&self, purchase: &Purchase) -> Result<StepOutcome> {
        if !purchase.payment.amount.is_positive() {
            return Err(SagaError::StepFailed {
                step: SagaStep::CreatePayment,
                reason: format!("invalid payment amount {}", purchase.payment.amount),
            });
        }
        self.repository
            .create_payment(PaymentRecord::from_purchase(purchase))
            .await
    }

    async fn compensate(&self, purchase_id: PurchaseId) -> Result<()> {
        if !self.repository.delete_payment(purchase_id).await? {
            tracing::debug!(purchase_id = %purchase_id, "No payment to void");
        }
        Ok(())
    }
}
