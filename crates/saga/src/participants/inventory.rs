use async_trait::async_trait;
use common::PurchaseId;
use domain::{Purchase, SagaStep};
use inventory::{Ledger, LedgerError};
use tracing::{info, warn};

use super::{Participant, StepOutcome};
use crate::Result;

/// Reserves and releases stock through the inventory ledger.
///
/// Replays are absorbed here: a reserve the ledger already applied and a
/// release of a reservation that is already released (or never existed) are
/// both reported as success. A reserve whose reservation was already released
/// is reported as compensated.
pub struct InventoryParticipant<L: Ledger> {
    ledger: L,
}

impl<L: Ledger> InventoryParticipant<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl<L: Ledger> Participant for InventoryParticipant<L> {
    fn step(&self) -> SagaStep {
        SagaStep::ReserveInventory
    }

    async fn execute(&self, purchase: &Purchase) -> Result<StepOutcome> {
        match self.ledger.reserve(purchase.id, &purchase.order.items).await {
            Ok(()) => Ok(StepOutcome::Applied),
            Err(LedgerError::AlreadyApplied(key)) => {
                let records = self.ledger.records(key).await?;
                if !records.is_empty() && records.iter().all(|r| r.released) {
                    return Ok(StepOutcome::Compensated);
                }
                info!(purchase_id = %key, "Reservation already applied");
                Ok(StepOutcome::Applied)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn compensate(&self, purchase_id: PurchaseId) -> Result<()> {
        match self.ledger.release(purchase_id).await {
            Ok(false) => Ok(()),
            Ok(true) => {
                info!(purchase_id = %purchase_id, "Reservation already released");
                Ok(())
            }
            Err(LedgerError::UnknownKey(key)) => {
                warn!(purchase_id = %key, "No reservation to release");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use common::{ProductId, UserId};
    use domain::{Money, Order, Payment, PurchasedItem};
    use inventory::{InMemoryLedger, NewProduct, ProductRepository};

    use super::*;
    use crate::SagaError;

    async fn setup(stock: i64) -> (InMemoryLedger, ProductId) {
        let ledger = InMemoryLedger::new();
        let product = ledger
            .create_product(NewProduct {
                name: "Lamp".into(),
                description: String::new(),
                brand_name: String::new(),
                price: Money::from_minor(1_000),
                inventory: stock,
            })
            .await
            .unwrap();
        (ledger, product.id)
    }

    fn purchase(id: u64, product: ProductId, amount: i64) -> Purchase {
        Purchase {
            id: PurchaseId::new(id),
            order: Order {
                user_id: UserId::new(1),
                items: vec![PurchasedItem::new(product, amount)],
            },
            payment: Payment {
                currency_code: "USD".into(),
                amount: Money::from_minor(1_000 * amount),
            },
        }
    }

    #[tokio::test]
    async fn redelivered_reserve_is_success() {
        let (ledger, product) = setup(5).await;
        let participant = InventoryParticipant::new(ledger.clone());
        let purchase = purchase(1, product, 2);

        participant.execute(&purchase).await.unwrap();
        participant.execute(&purchase).await.unwrap();

        assert_eq!(ledger.stock(product).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn reserve_after_release_is_compensated() {
        let (ledger, product) = setup(5).await;
        let participant = InventoryParticipant::new(ledger.clone());
        let purchase = purchase(5, product, 2);

        assert_eq!(
            participant.execute(&purchase).await.unwrap(),
            StepOutcome::Applied
        );
        participant.compensate(purchase.id).await.unwrap();

        assert_eq!(
            participant.execute(&purchase).await.unwrap(),
            StepOutcome::Compensated
        );
        assert_eq!(ledger.stock(product).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn insufficient_stock_is_a_failure() {
        let (ledger, product) = setup(1).await;
        let participant = InventoryParticipant::new(ledger.clone());

        let err = participant
            .execute(&purchase(2, product, 2))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SagaError::Ledger(LedgerError::InsufficientStock { .. })
        ));
        assert_eq!(ledger.stock(product).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn release_is_idempotent_and_tolerates_unknown_keys() {
        let (ledger, product) = setup(5).await;
        let participant = InventoryParticipant::new(ledger.clone());
        participant.execute(&purchase(3, product, 4)).await.unwrap();

        participant.compensate(PurchaseId::new(3)).await.unwrap();
        participant.compensate(PurchaseId::new(3)).await.unwrap();
        participant.compensate(PurchaseId::new(42)).await.unwrap();

        assert_eq!(ledger.stock(product).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn storage_failures_surface() {
        let (ledger, product) = setup(5).await;
        let participant = InventoryParticipant::new(ledger.clone());
        participant.execute(&purchase(4, product, 1)).await.unwrap();
        ledger.set_fail_on_release(true).await;

        assert!(participant.compensate(PurchaseId::new(4)).await.is_err());
    }
}
