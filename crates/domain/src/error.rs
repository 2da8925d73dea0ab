//! Domain error types.

use common::{IdError, ProductId};
use event_bus::BusError;
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The cart has no items.
    #[error("Cart is empty")]
    EmptyCart,

    /// A cart line has a non-positive amount.
    #[error("Invalid amount {amount} for product {product_id}")]
    InvalidCartItemAmount { product_id: ProductId, amount: i64 },

    /// The currency code is blank.
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),

    /// A cart line refers to a product that does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The purchase total does not fit into the money type.
    #[error("Purchase amount overflow")]
    AmountOverflow,

    /// A reply carries a handler tag outside the known set.
    #[error("Unknown handler tag: {0}")]
    UnknownHandler(String),

    /// The product catalog could not be queried.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// No purchase id could be generated.
    #[error("Id generation failed: {0}")]
    IdGeneration(#[from] IdError),

    /// The start command could not be published.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
