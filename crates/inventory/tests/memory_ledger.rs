//! Ledger contract tests against the in-memory implementation.

use common::{ProductId, PurchaseId};
use domain::{Money, PurchasedItem};
use inventory::{InMemoryLedger, Ledger, LedgerError, NewProduct, ProductRepository};

async fn ledger_with(inventory: i64) -> (InMemoryLedger, ProductId) {
    let ledger = InMemoryLedger::new();
    let product = ledger
        .create_product(NewProduct {
            name: "Widget".into(),
            description: String::new(),
            brand_name: String::new(),
            price: Money::from_minor(500),
            inventory,
        })
        .await
        .unwrap();
    (ledger, product.id)
}

#[tokio::test]
async fn sold_out_product_rejects_further_reserves() {
    let (ledger, product) = ledger_with(5).await;

    ledger
        .reserve(PurchaseId::new(1), &[PurchasedItem::new(product, 5)])
        .await
        .unwrap();
    let err = ledger
        .reserve(PurchaseId::new(2), &[PurchasedItem::new(product, 1)])
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::InsufficientStock { .. }));
    assert_eq!(ledger.stock(product).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reserves_never_oversell() {
    let (ledger, product) = ledger_with(10).await;

    let handles: Vec<_> = (1..=50u64)
        .map(|n| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                ledger
                    .reserve(PurchaseId::new(n), &[PurchasedItem::new(product, 1)])
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(ledger.stock(product).await.unwrap(), 0);
    assert_eq!(ledger.reservation_count().await, 10);
}

#[tokio::test]
async fn duplicate_reserve_decrements_once() {
    let (ledger, product) = ledger_with(10).await;
    let key = PurchaseId::new(3);

    ledger
        .reserve(key, &[PurchasedItem::new(product, 4)])
        .await
        .unwrap();
    let err = ledger
        .reserve(key, &[PurchasedItem::new(product, 4)])
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::AlreadyApplied(_)));
    assert_eq!(ledger.stock(product).await.unwrap(), 6);
}

#[tokio::test]
async fn duplicate_release_increments_once() {
    let (ledger, product) = ledger_with(10).await;
    let key = PurchaseId::new(4);
    ledger
        .reserve(key, &[PurchasedItem::new(product, 4)])
        .await
        .unwrap();

    assert!(!ledger.release(key).await.unwrap());
    assert!(ledger.release(key).await.unwrap());
    assert_eq!(ledger.stock(product).await.unwrap(), 10);
}

#[tokio::test]
async fn release_of_unknown_key_changes_nothing() {
    let (ledger, product) = ledger_with(10).await;

    let err = ledger.release(PurchaseId::new(99)).await.unwrap_err();

    assert!(matches!(err, LedgerError::UnknownKey(_)));
    assert_eq!(ledger.stock(product).await.unwrap(), 10);
    assert_eq!(ledger.reservation_count().await, 0);
}

#[tokio::test]
async fn invalid_reservations_touch_nothing() {
    let (ledger, product) = ledger_with(10).await;

    assert!(matches!(
        ledger.reserve(PurchaseId::new(5), &[]).await,
        Err(LedgerError::EmptyReservation)
    ));
    assert!(matches!(
        ledger
            .reserve(PurchaseId::new(5), &[PurchasedItem::new(product, 0)])
            .await,
        Err(LedgerError::InvalidAmount { .. })
    ));
    assert_eq!(ledger.stock(product).await.unwrap(), 10);
    assert!(ledger.records(PurchaseId::new(5)).await.unwrap().is_empty());
}
