//! Domain layer for the purchase saga.
//!
//! This crate provides:
//! - the purchase model and cart pricing (`PurchaseService`)
//! - saga steps, step statuses and outcomes
//! - the closed set of handler tags and the topic names
//! - the JSON payloads exchanged over the bus

pub mod error;
pub mod purchase;

pub use error::DomainError;
pub use purchase::{
    CreatePurchase, Handler, Money, Order, Payment, ProductCatalog, ProductStatus, Purchase,
    PurchaseBody, PurchaseCommand, PurchaseCreated, PurchaseReply, PurchaseResult,
    PurchaseService, PurchasedItem, RollbackCommand, RollbackReply, SagaOutcome, SagaStep,
    StepStatus, topics,
};
