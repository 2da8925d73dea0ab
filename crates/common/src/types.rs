use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a purchase.
///
/// Purchase ids are time-ordered 63-bit integers produced by
/// [`IdGenerator`](crate::IdGenerator). The same value is used as the
/// order id, the payment id and the inventory idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseId(u64);

impl PurchaseId {
    /// Creates a purchase ID from a raw value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the value as a signed integer for storage in `BIGINT` columns.
    ///
    /// Generated ids never use the sign bit, so the conversion is lossless.
    pub fn as_i64(&self) -> i64 {
        self.0 as i64
    }

    /// Creates a purchase ID from a `BIGINT` column value.
    pub fn from_i64(value: i64) -> Self {
        Self(value as u64)
    }
}

impl std::fmt::Display for PurchaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PurchaseId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<PurchaseId> for u64 {
    fn from(id: PurchaseId) -> Self {
        id.0
    }
}

/// Identifier of the user who placed a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
    /// Creates a user ID from a raw value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Identifier of a product in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(u64);

impl ProductId {
    /// Creates a product ID from a raw value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the value as a signed integer for storage in `BIGINT` columns.
    pub fn as_i64(&self) -> i64 {
        self.0 as i64
    }

    /// Creates a product ID from a `BIGINT` column value.
    pub fn from_i64(value: i64) -> Self {
        Self(value as u64)
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ProductId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Correlation identifier shared by every message of one saga run.
///
/// Generated once when a purchase is created and propagated unchanged
/// through commands, replies, compensations and result events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Creates a new random correlation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an existing correlation ID received from the wire.
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the correlation ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
