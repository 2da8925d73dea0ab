//! Purchase domain: priced carts, the saga's steps and statuses, the
//! handler tags replies are dispatched on and the payloads on the wire.

mod handler;
mod messages;
mod saga;
mod service;
mod value_objects;

pub use handler::{Handler, topics};
pub use messages::{
    PurchaseBody, PurchaseCommand, PurchaseReply, PurchaseResult, RollbackCommand, RollbackReply,
};
pub use saga::{SagaOutcome, SagaStep, StepStatus};
pub use service::{CreatePurchase, ProductCatalog, ProductStatus, PurchaseCreated, PurchaseService};
pub use value_objects::{Money, Order, Payment, Purchase, PurchasedItem};
