//! Order step: persists the order part of a purchase.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::PurchaseId;
use domain::{Order, Purchase, SagaStep};
use tokio::sync::RwLock;

use super::{Participant, StepOutcome};
use crate::{Result, SagaError};

/// Storage for orders, keyed on purchase id.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Stores the order. Storing the same purchase again is a no-op, and a
    /// purchase whose order was rolled back is never stored again.
    async fn create_order(&self, purchase_id: PurchaseId, order: &Order) -> Result<StepOutcome>;

    /// Deletes the order, remembers the rollback and returns whether the
    /// order existed.
    async fn delete_order(&self, purchase_id: PurchaseId) -> Result<bool>;

    /// Loads an order.
    async fn get_order(&self, purchase_id: PurchaseId) -> Result<Option<Order>>;
}

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: HashMap<PurchaseId, Order>,
    rolled_back: HashSet<PurchaseId>,
    fail_on_create: bool,
    fail_on_delete: bool,
}

/// In-memory order repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRepository {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent creates fail.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    /// Makes subsequent deletes fail.
    pub async fn set_fail_on_delete(&self, fail: bool) {
        self.state.write().await.fail_on_delete = fail;
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create_order(&self, purchase_id: PurchaseId, order: &Order) -> Result<StepOutcome> {
        let mut state = self.state.write().await;
        if state.fail_on_create {
            return Err(SagaError::StepFailed {
                step: SagaStep::CreateOrder,
                reason: "order store rejected the write".into(),
            });
        }
        if state.rolled_back.contains(&purchase_id) {
            return Ok(StepOutcome::Compensated);
        }
        state
            .orders
            .entry(purchase_id)
            .or_insert_with(|| order.clone());
        Ok(StepOutcome::Applied)
    }

    async fn delete_order(&self, purchase_id: PurchaseId) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.fail_on_delete {
            return Err(SagaError::CompensationFailed {
                step: SagaStep::CreateOrder,
                reason: "order store rejected the delete".into(),
            });
        }
        state.rolled_back.insert(purchase_id);
        Ok(state.orders.remove(&purchase_id).is_some())
    }

    async fn get_order(&self, purchase_id: PurchaseId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&purchase_id).cloned())
    }
}

/// Creates the order and deletes it on compensation.
pub struct OrderParticipant<R: OrderRepository> {
    repository: R,
}

impl<R: OrderRepository> OrderParticipant<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl<R: OrderRepository> Participant for OrderParticipant<R> {
    fn step(&self) -> SagaStep {
        SagaStep::CreateOrder
    }

    async fn execute(&self, purchase: &Purchase) -> Result<StepOutcome> {
        self.repository
            .create_order(purchase.id, &purchase.order)
            .await
    }

    async fn compensate(&self, purchase_id: PurchaseId) -> Result<()> {
        if !self.repository.delete_order(purchase_id).await? {
            tracing::debug!(purchase_id = %purchase_id, "No order to delete");
        }
        Ok(())
    }
}
