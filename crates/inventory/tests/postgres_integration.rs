//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p inventory --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::{ProductId, PurchaseId};
use domain::{Money, PurchasedItem};
use inventory::{Ledger, LedgerError, NewProduct, PostgresLedger, ProductRepository};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_inventory_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh ledger with its own pool and cleared tables
async fn get_test_ledger() -> PostgresLedger {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE idempotency_records, products RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    PostgresLedger::new(pool)
}

async fn create_product(ledger: &PostgresLedger, inventory: i64) -> ProductId {
    ledger
        .create_product(NewProduct {
            name: "Widget".into(),
            description: "A widget".into(),
            brand_name: "Acme".into(),
            price: Money::from_minor(1999),
            inventory,
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
#[serial]
async fn sold_out_product_rejects_further_reserves() {
    let ledger = get_test_ledger().await;
    let product = create_product(&ledger, 5).await;

    ledger
        .reserve(PurchaseId::new(1), &[PurchasedItem::new(product, 5)])
        .await
        .unwrap();

    let err = ledger
        .reserve(PurchaseId::new(2), &[PurchasedItem::new(product, 1)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientStock {
            requested: 1,
            available: 0,
            ..
        }
    ));
    assert_eq!(ledger.stock(product).await.unwrap(), 0);
    assert!(ledger.records(PurchaseId::new(2)).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn concurrent_reserves_never_oversell() {
    let ledger = get_test_ledger().await;
    let product = create_product(&ledger, 10).await;

    let handles: Vec<_> = (1..=25u64)
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
        match handle.await.unwrap() {
            Ok(()) => succeeded += 1,
            Err(LedgerError::InsufficientStock { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(ledger.stock(product).await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn concurrent_multi_product_reserves_do_not_deadlock() {
    let ledger = get_test_ledger().await;
    let a = create_product(&ledger, 100).await;
    let b = create_product(&ledger, 100).await;

    // Half the purchases list the products in reverse order
    let handles: Vec<_> = (1..=20u64)
        .map(|n| {
            let ledger = ledger.clone();
            let items = if n % 2 == 0 {
                vec![PurchasedItem::new(a, 1), PurchasedItem::new(b, 2)]
            } else {
                vec![PurchasedItem::new(b, 2), PurchasedItem::new(a, 1)]
            };
            tokio::spawn(async move { ledger.reserve(PurchaseId::new(n), &items).await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(ledger.stock(a).await.unwrap(), 80);
    assert_eq!(ledger.stock(b).await.unwrap(), 60);
}

#[tokio::test]
#[serial]
async fn insufficient_stock_rolls_back_every_line() {
    let ledger = get_test_ledger().await;
    let plenty = create_product(&ledger, 10).await;
    let scarce = create_product(&ledger, 1).await;

    let err = ledger
        .reserve(
            PurchaseId::new(7),
            &[PurchasedItem::new(plenty, 3), PurchasedItem::new(scarce, 2)],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::InsufficientStock { product_id, .. } if product_id == scarce));
    assert_eq!(ledger.stock(plenty).await.unwrap(), 10);
    assert_eq!(ledger.stock(scarce).await.unwrap(), 1);
    assert!(ledger.records(PurchaseId::new(7)).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn duplicate_reserve_is_already_applied() {
    let ledger = get_test_ledger().await;
    let product = create_product(&ledger, 10).await;
    let key = PurchaseId::new(42);
    let items = [PurchasedItem::new(product, 2), PurchasedItem::new(product, 1)];

    ledger.reserve(key, &items).await.unwrap();
    let err = ledger.reserve(key, &items).await.unwrap_err();

    assert!(matches!(err, LedgerError::AlreadyApplied(k) if k == key));
    assert_eq!(ledger.stock(product).await.unwrap(), 7);

    // Duplicate lines are merged into a single record
    let records = ledger.records(key).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].amount, 3);
}

#[tokio::test]
#[serial]
async fn racing_duplicate_reserves_apply_once() {
    let ledger = get_test_ledger().await;
    let product = create_product(&ledger, 100).await;
    let key = PurchaseId::new(9);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.reserve(key, &[PurchasedItem::new(product, 5)]).await })
        })
        .collect();

    let mut applied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => applied += 1,
            Err(LedgerError::AlreadyApplied(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(ledger.stock(product).await.unwrap(), 95);
}

#[tokio::test]
#[serial]
async fn release_is_idempotent() {
    let ledger = get_test_ledger().await;
    let product = create_product(&ledger, 10).await;
    let key = PurchaseId::new(11);

    ledger
        .reserve(key, &[PurchasedItem::new(product, 4)])
        .await
        .unwrap();
    assert_eq!(ledger.stock(product).await.unwrap(), 6);

    assert!(!ledger.release(key).await.unwrap());
    assert_eq!(ledger.stock(product).await.unwrap(), 10);

    assert!(ledger.release(key).await.unwrap());
    assert_eq!(ledger.stock(product).await.unwrap(), 10);
    assert!(ledger.records(key).await.unwrap().iter().all(|r| r.released));
}

#[tokio::test]
#[serial]
async fn concurrent_releases_restore_once() {
    let ledger = get_test_ledger().await;
    let product = create_product(&ledger, 10).await;
    let key = PurchaseId::new(12);
    ledger
        .reserve(key, &[PurchasedItem::new(product, 4)])
        .await
        .unwrap();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.release(key).await })
        })
        .collect();

    let mut fresh = 0;
    for handle in handles {
        if !handle.await.unwrap().unwrap() {
            fresh += 1;
        }
    }

    assert_eq!(fresh, 1);
    assert_eq!(ledger.stock(product).await.unwrap(), 10);
}

#[tokio::test]
#[serial]
async fn release_of_unknown_key_changes_nothing() {
    let ledger = get_test_ledger().await;
    let product = create_product(&ledger, 3).await;

    let err = ledger.release(PurchaseId::new(404)).await.unwrap_err();

    assert!(matches!(err, LedgerError::UnknownKey(k) if k == PurchaseId::new(404)));
    assert_eq!(ledger.stock(product).await.unwrap(), 3);
}

#[tokio::test]
#[serial]
async fn reserve_of_missing_product_fails() {
    let ledger = get_test_ledger().await;
    let product = create_product(&ledger, 3).await;

    let err = ledger
        .reserve(
            PurchaseId::new(13),
            &[
                PurchasedItem::new(product, 1),
                PurchasedItem::new(ProductId::new(9_999), 1),
            ],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::ProductNotFound(id) if id == ProductId::new(9_999)));
    assert_eq!(ledger.stock(product).await.unwrap(), 3);
}

#[tokio::test]
#[serial]
async fn catalog_round_trip() {
    let ledger = get_test_ledger().await;
    let id = create_product(&ledger, 3).await;

    let product = ledger.get_product(id).await.unwrap();
    assert_eq!(product.name, "Widget");
    assert_eq!(product.brand_name, "Acme");
    assert_eq!(product.price, Money::from_minor(1999));

    let listed = ledger.list_products().await.unwrap();
    assert_eq!(listed.len(), 1);

    let statuses = ProductRepository::check_products(&ledger, &[ProductId::new(9_999), id])
        .await
        .unwrap();
    assert!(!statuses[0].exists);
    assert!(statuses[1].exists);
    assert_eq!(statuses[1].price, Money::from_minor(1999));
}
