use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{ProductId, PurchaseId};
use domain::{DomainError, ProductCatalog, ProductStatus, PurchasedItem};
use tokio::sync::RwLock;

use crate::catalog::missing;
use crate::ledger::{merge_items, observe_release, observe_reserve};
use crate::{
    IdempotencyRecord, Ledger, LedgerError, NewProduct, Product, ProductRepository, Result,
};

/// In-memory ledger for tests and database-less runs.
///
/// A single lock guards products and records together, so every reserve
/// and release is atomic. It serializes all operations rather than
/// modelling per-row locks.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

#[derive(Default)]
struct LedgerState {
    products: BTreeMap<ProductId, Product>,
    records: HashMap<PurchaseId, Vec<IdempotencyRecord>>,
    next_product_id: u64,
    fail_on_reserve: bool,
    fail_on_release: bool,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent reserves fail with a storage error.
    pub async fn set_fail_on_reserve(&self, fail: bool) {
        self.state.write().await.fail_on_reserve = fail;
    }

    /// Makes subsequent releases fail with a storage error.
    pub async fn set_fail_on_release(&self, fail: bool) {
        self.state.write().await.fail_on_release = fail;
    }

    /// Returns the number of purchases with a reservation.
    pub async fn reservation_count(&self) -> usize {
        self.state.read().await.records.len()
    }

    async fn reserve_locked(&self, key: PurchaseId, items: &[PurchasedItem]) -> Result<()> {
        let lines = merge_items(items)?;
        let mut state = self.state.write().await;

        if state.fail_on_reserve {
            return Err(LedgerError::Unavailable("simulated reserve failure".into()));
        }
        if state.records.contains_key(&key) {
            return Err(LedgerError::AlreadyApplied(key));
        }

        // Check every line before touching any counter
        for &(product_id, amount) in &lines {
            let product = state
                .products
                .get(&product_id)
                .ok_or(LedgerError::ProductNotFound(product_id))?;
            if product.inventory < amount {
                return Err(LedgerError::InsufficientStock {
                    product_id,
                    requested: amount,
                    available: product.inventory,
                });
            }
        }

        let mut records = Vec::with_capacity(lines.len());
        for (product_id, amount) in lines {
            if let Some(product) = state.products.get_mut(&product_id) {
                product.inventory -= amount;
            }
            records.push(IdempotencyRecord {
                purchase_id: key,
                product_id,
                amount,
                released: false,
            });
        }
        state.records.insert(key, records);
        Ok(())
    }

    async fn release_locked(&self, key: PurchaseId) -> Result<bool> {
        let mut state = self.state.write().await;

        if state.fail_on_release {
            return Err(LedgerError::Unavailable("simulated release failure".into()));
        }

        let LedgerState {
            products, records, ..
        } = &mut *state;
        let records = records.get_mut(&key).ok_or(LedgerError::UnknownKey(key))?;
        if records.first().is_some_and(|r| r.released) {
            return Ok(true);
        }

        for record in records.iter_mut() {
            if let Some(product) = products.get_mut(&record.product_id) {
                product.inventory += record.amount;
            }
            record.released = true;
        }
        Ok(false)
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    #[tracing::instrument(skip(self, items), fields(purchase_id = %key))]
    async fn reserve(&self, key: PurchaseId, items: &[PurchasedItem]) -> Result<()> {
        let result = self.reserve_locked(key, items).await;
        observe_reserve(&result);
        result
    }

    #[tracing::instrument(skip(self), fields(purchase_id = %key))]
    async fn release(&self, key: PurchaseId) -> Result<bool> {
        let result = self.release_locked(key).await;
        observe_release(&result);
        result
    }

    async fn stock(&self, product_id: ProductId) -> Result<i64> {
        self.state
            .read()
            .await
            .products
            .get(&product_id)
            .map(|p| p.inventory)
            .ok_or(LedgerError::ProductNotFound(product_id))
    }

    async fn records(&self, key: PurchaseId) -> Result<Vec<IdempotencyRecord>> {
        Ok(self
            .state
            .read()
            .await
            .records
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ProductRepository for InMemoryLedger {
    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        product.validate()?;
        let mut state = self.state.write().await;
        state.next_product_id += 1;
        let stored = Product {
            id: ProductId::new(state.next_product_id),
            name: product.name,
            description: product.description,
            brand_name: product.brand_name,
            price: product.price,
            inventory: product.inventory,
            created_at: Utc::now(),
        };
        state.products.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_product(&self, id: ProductId) -> Result<Product> {
        self.state
            .read()
            .await
            .products
            .get(&id)
            .cloned()
            .ok_or(LedgerError::ProductNotFound(id))
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        Ok(self.state.read().await.products.values().cloned().collect())
    }

    async fn check_products(&self, ids: &[ProductId]) -> Result<Vec<ProductStatus>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .map(|id| match state.products.get(id) {
                Some(product) => ProductStatus {
                    product_id: *id,
                    price: product.price,
                    exists: true,
                },
                None => missing(*id),
            })
            .collect())
    }
}

#[async_trait]
impl ProductCatalog for InMemoryLedger {
    async fn check_products(
        &self,
        ids: &[ProductId],
    ) -> std::result::Result<Vec<ProductStatus>, DomainError> {
        ProductRepository::check_products(self, ids)
            .await
            .map_err(|e| DomainError::Catalog(e.to_string()))
    }
}
