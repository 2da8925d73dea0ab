use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::saga::SagaStep;
use crate::DomainError;

/// Topic names used by the purchase saga.
pub mod topics {
    pub const PURCHASE_START: &str = "purchase.start";
    pub const REPLY: &str = "reply";
    pub const INVENTORY_RESERVE: &str = "inventory.reserve";
    pub const INVENTORY_RELEASE: &str = "inventory.release";
    pub const ORDER_CREATE: &str = "order.create";
    pub const ORDER_ROLLBACK: &str = "order.rollback";
    pub const PAYMENT_CREATE: &str = "payment.create";
    pub const PAYMENT_ROLLBACK: &str = "payment.rollback";
    pub const PURCHASE_RESULT: &str = "purchase.result";
}

/// Tag carried in the `handler` metadata of every reply.
///
/// Identifies the step and direction (forward or compensation) that
/// produced the reply. The orchestrator dispatches purely on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Handler {
    ReserveInventory,
    ReleaseInventory,
    CreateOrder,
    RollbackOrder,
    CreatePayment,
    RollbackPayment,
}

impl Handler {
    /// Returns the saga step the handler belongs to.
    pub fn step(&self) -> SagaStep {
        match self {
            Handler::ReserveInventory | Handler::ReleaseInventory => SagaStep::ReserveInventory,
            Handler::CreateOrder | Handler::RollbackOrder => SagaStep::CreateOrder,
            Handler::CreatePayment | Handler::RollbackPayment => SagaStep::CreatePayment,
        }
    }

    /// Returns true for compensation handlers.
    pub fn is_compensation(&self) -> bool {
        matches!(
            self,
            Handler::ReleaseInventory | Handler::RollbackOrder | Handler::RollbackPayment
        )
    }

    /// Returns the wire name of the tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Handler::ReserveInventory => "reserve-inventory",
            Handler::ReleaseInventory => "release-inventory",
            Handler::CreateOrder => "create-order",
            Handler::RollbackOrder => "rollback-order",
            Handler::CreatePayment => "create-payment",
            Handler::RollbackPayment => "rollback-payment",
        }
    }
}

impl FromStr for Handler {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reserve-inventory" => Ok(Handler::ReserveInventory),
            "release-inventory" => Ok(Handler::ReleaseInventory),
            "create-order" => Ok(Handler::CreateOrder),
            "rollback-order" => Ok(Handler::RollbackOrder),
            "create-payment" => Ok(Handler::CreatePayment),
            "rollback-payment" => Ok(Handler::RollbackPayment),
            other => Err(DomainError::UnknownHandler(other.to_string())),
        }
    }
}

impl std::fmt::Display for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
