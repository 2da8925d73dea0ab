use std::collections::BTreeMap;

use async_trait::async_trait;
use common::{ProductId, PurchaseId};
use domain::PurchasedItem;
use serde::Serialize;

use crate::{LedgerError, Result};

/// One reserved product line of a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdempotencyRecord {
    pub purchase_id: PurchaseId,
    pub product_id: ProductId,
    pub amount: i64,
    pub released: bool,
}

/// Stock counters guarded by an idempotency log keyed on purchase id.
///
/// For a given key either no records exist or exactly one record per
/// reserved product exists, and `released` flips to true at most once.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Decrements stock for every item, all or nothing.
    ///
    /// Fails with [`LedgerError::AlreadyApplied`] if the key was already
    /// reserved, leaving stock untouched.
    async fn reserve(&self, key: PurchaseId, items: &[PurchasedItem]) -> Result<()>;

    /// Restores the stock reserved under `key`.
    ///
    /// Returns `true` if the reservation had already been released, in
    /// which case nothing changes.
    async fn release(&self, key: PurchaseId) -> Result<bool>;

    /// Returns the current stock of a product.
    async fn stock(&self, product_id: ProductId) -> Result<i64>;

    /// Returns the idempotency records of a key, ordered by product id.
    async fn records(&self, key: PurchaseId) -> Result<Vec<IdempotencyRecord>>;
}

/// Validates reservation lines and merges duplicates.
///
/// The result is ordered by ascending product id, which is the order rows
/// must be locked in.
pub fn merge_items(items: &[PurchasedItem]) -> Result<Vec<(ProductId, i64)>> {
    if items.is_empty() {
        return Err(LedgerError::EmptyReservation);
    }

    let mut merged: BTreeMap<ProductId, i64> = BTreeMap::new();
    for item in items {
        if item.amount <= 0 {
            return Err(LedgerError::InvalidAmount {
                product_id: item.product_id,
                amount: item.amount,
            });
        }
        let total = merged.entry(item.product_id).or_default();
        *total = total
            .checked_add(item.amount)
            .ok_or(LedgerError::InvalidAmount {
                product_id: item.product_id,
                amount: item.amount,
            })?;
    }

    Ok(merged.into_iter().collect())
}

pub(crate) fn observe_reserve(result: &Result<()>) {
    let outcome = match result {
        Ok(()) => "reserved",
        Err(e) => e.outcome(),
    };
    metrics::counter!("ledger_reserve_total", "outcome" => outcome).increment(1);
}

pub(crate) fn observe_release(result: &Result<bool>) {
    let outcome = match result {
        Ok(false) => "released",
        Ok(true) => "already_released",
        Err(e) => e.outcome(),
    };
    metrics::counter!("ledger_release_total", "outcome" => outcome).increment(1);
}
