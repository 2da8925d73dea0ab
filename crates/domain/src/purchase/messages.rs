//! Wire payloads exchanged between the orchestrator and the participants.
//!
//! All payloads are JSON objects with camelCase field names.

use chrono::{DateTime, Utc};
use common::{PurchaseId, UserId};
use serde::{Deserialize, Serialize};

use super::saga::{SagaStep, StepStatus};
use super::value_objects::{Order, Payment, Purchase};

/// Purchase contents as carried inside commands and replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseBody {
    pub order: Order,
    pub payment: Payment,
}

/// Forward command: `purchase.start` and every forward step topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseCommand {
    pub purchase_id: PurchaseId,
    pub purchase: PurchaseBody,
    pub timestamp: DateTime<Utc>,
}

impl PurchaseCommand {
    /// Creates a command for the given purchase.
    pub fn new(purchase: &Purchase) -> Self {
        Self {
            purchase_id: purchase.id,
            purchase: PurchaseBody {
                order: purchase.order.clone(),
                payment: purchase.payment.clone(),
            },
            timestamp: Utc::now(),
        }
    }

    /// Rebuilds the purchase carried by the command.
    pub fn into_purchase(self) -> Purchase {
        Purchase {
            id: self.purchase_id,
            order: self.purchase.order,
            payment: self.purchase.payment,
        }
    }
}

/// Reply to a forward command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReply {
    pub purchase_id: PurchaseId,
    pub purchase: PurchaseBody,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl PurchaseReply {
    /// Creates a successful reply.
    pub fn success(purchase: &Purchase) -> Self {
        Self::build(purchase, true, None)
    }

    /// Creates a failed reply with a free-text reason.
    pub fn failure(purchase: &Purchase, error: impl Into<String>) -> Self {
        Self::build(purchase, false, Some(error.into()))
    }

    fn build(purchase: &Purchase, success: bool, error: Option<String>) -> Self {
        let command = PurchaseCommand::new(purchase);
        Self {
            purchase_id: command.purchase_id,
            purchase: command.purchase,
            success,
            error,
            timestamp: command.timestamp,
        }
    }

    /// Rebuilds the purchase carried by the reply.
    pub fn purchase(&self) -> Purchase {
        Purchase {
            id: self.purchase_id,
            order: self.purchase.order.clone(),
            payment: self.purchase.payment.clone(),
        }
    }
}

/// Compensation command for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackCommand {
    pub purchase_id: PurchaseId,
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
}

impl RollbackCommand {
    pub fn new(purchase_id: PurchaseId, user_id: UserId) -> Self {
        Self {
            purchase_id,
            user_id,
            timestamp: Utc::now(),
        }
    }
}

/// Reply to a compensation command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackReply {
    pub user_id: UserId,
    pub purchase_id: PurchaseId,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RollbackReply {
    pub fn success(command: &RollbackCommand) -> Self {
        Self {
            user_id: command.user_id,
            purchase_id: command.purchase_id,
            success: true,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(command: &RollbackCommand, error: impl Into<String>) -> Self {
        Self {
            user_id: command.user_id,
            purchase_id: command.purchase_id,
            success: false,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Entry of the purchase result stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResult {
    pub user_id: UserId,
    pub purchase_id: PurchaseId,
    pub step: SagaStep,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
}

impl PurchaseResult {
    pub fn new(user_id: UserId, purchase_id: PurchaseId, step: SagaStep, status: StepStatus) -> Self {
        Self {
            user_id,
            purchase_id,
            step,
            status,
            timestamp: Utc::now(),
        }
    }
}
