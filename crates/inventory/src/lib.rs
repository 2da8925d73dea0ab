//! Inventory ledger for the purchase saga.
//!
//! This crate provides:
//! - `Ledger`: idempotent stock reservation and release keyed on purchase id
//! - `ProductRepository`: the product catalog the ledger's counters belong to
//! - `PostgresLedger`: production implementation using row-level locks
//! - `InMemoryLedger`: single-lock implementation for tests and local runs

pub mod catalog;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;

pub use catalog::{NewProduct, Product, ProductRepository};
pub use error::{LedgerError, Result};
pub use ledger::{IdempotencyRecord, Ledger, merge_items};
pub use memory::InMemoryLedger;
pub use postgres::PostgresLedger;
