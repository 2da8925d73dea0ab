use common::{ProductId, PurchaseId};
use thiserror::Error;

/// Errors that can occur when interacting with the inventory ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A reservation for this purchase has already been applied.
    #[error("Reservation already applied for purchase {0}")]
    AlreadyApplied(PurchaseId),

    /// A product does not have enough stock for the requested amount.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    /// The product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// No reservation exists for this purchase.
    #[error("No reservation found for purchase {0}")]
    UnknownKey(PurchaseId),

    /// A reservation line has a non-positive amount.
    #[error("Invalid amount {amount} for product {product_id}")]
    InvalidAmount { product_id: ProductId, amount: i64 },

    /// The reservation has no items.
    #[error("Reservation has no items")]
    EmptyReservation,

    /// A new product failed validation.
    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    /// The backing store is unavailable.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl LedgerError {
    /// Returns true for storage failures, as opposed to business outcomes.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            LedgerError::Unavailable(_) | LedgerError::Database(_) | LedgerError::Migration(_)
        )
    }

    /// Short label used for the `outcome` metric dimension.
    pub fn outcome(&self) -> &'static str {
        match self {
            LedgerError::AlreadyApplied(_) => "already_applied",
            LedgerError::InsufficientStock { .. } => "insufficient_stock",
            LedgerError::ProductNotFound(_) => "product_not_found",
            LedgerError::UnknownKey(_) => "unknown_key",
            LedgerError::InvalidAmount { .. } => "invalid_amount",
            LedgerError::EmptyReservation => "empty_reservation",
            LedgerError::InvalidProduct(_) => "invalid_product",
            LedgerError::Unavailable(_) | LedgerError::Database(_) | LedgerError::Migration(_) => {
                "storage_error"
            }
        }
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
