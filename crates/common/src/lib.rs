//! Shared identifiers for the purchase saga services.

pub mod id;
pub mod types;

pub use id::{IdError, IdGenerator, IdParts};
pub use types::{CorrelationId, ProductId, PurchaseId, UserId};
