//! Saga steps, step statuses and outcomes.

use serde::{Deserialize, Serialize};

use super::handler::{Handler, topics};

/// A forward step of the purchase saga, in execution order.
///
/// ```text
/// ReserveInventory ──► CreateOrder ──► CreatePayment
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStep {
    ReserveInventory,
    CreateOrder,
    CreatePayment,
}

impl SagaStep {
    /// All steps in forward order.
    pub const ALL: [SagaStep; 3] = [
        SagaStep::ReserveInventory,
        SagaStep::CreateOrder,
        SagaStep::CreatePayment,
    ];

    /// Returns the first step.
    pub fn first() -> Self {
        SagaStep::ReserveInventory
    }

    /// Returns the step executed after this one.
    pub fn next(&self) -> Option<SagaStep> {
        match self {
            SagaStep::ReserveInventory => Some(SagaStep::CreateOrder),
            SagaStep::CreateOrder => Some(SagaStep::CreatePayment),
            SagaStep::CreatePayment => None,
        }
    }

    /// Returns the step executed before this one.
    pub fn previous(&self) -> Option<SagaStep> {
        match self {
            SagaStep::ReserveInventory => None,
            SagaStep::CreateOrder => Some(SagaStep::ReserveInventory),
            SagaStep::CreatePayment => Some(SagaStep::CreateOrder),
        }
    }

    /// Returns the topic the forward command is published to.
    pub fn command_topic(&self) -> &'static str {
        match self {
            SagaStep::ReserveInventory => topics::INVENTORY_RESERVE,
            SagaStep::CreateOrder => topics::ORDER_CREATE,
            SagaStep::CreatePayment => topics::PAYMENT_CREATE,
        }
    }

    /// Returns the topic the compensation command is published to.
    pub fn compensation_topic(&self) -> &'static str {
        match self {
            SagaStep::ReserveInventory => topics::INVENTORY_RELEASE,
            SagaStep::CreateOrder => topics::ORDER_ROLLBACK,
            SagaStep::CreatePayment => topics::PAYMENT_ROLLBACK,
        }
    }

    /// Returns the handler tag of this step's forward reply.
    pub fn forward_handler(&self) -> Handler {
        match self {
            SagaStep::ReserveInventory => Handler::ReserveInventory,
            SagaStep::CreateOrder => Handler::CreateOrder,
            SagaStep::CreatePayment => Handler::CreatePayment,
        }
    }

    /// Returns the handler tag of this step's compensation reply.
    pub fn compensation_handler(&self) -> Handler {
        match self {
            SagaStep::ReserveInventory => Handler::ReleaseInventory,
            SagaStep::CreateOrder => Handler::RollbackOrder,
            SagaStep::CreatePayment => Handler::RollbackPayment,
        }
    }

    /// Returns the step name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStep::ReserveInventory => "RESERVE_INVENTORY",
            SagaStep::CreateOrder => "CREATE_ORDER",
            SagaStep::CreatePayment => "CREATE_PAYMENT",
        }
    }
}

impl std::fmt::Display for SagaStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of one saga step as reported on the result stream.
///
/// State transitions:
/// ```text
/// Executing ──┬──► Succeeded ──┬──► Compensated
///             │                └──► CompensationFailed
///             └──► Failed ─────┬──► Compensated
///                              └──► CompensationFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Executing,
    Succeeded,
    Failed,
    Compensated,
    CompensationFailed,
}

impl StepStatus {
    /// Returns true if a step may move from this status to `next`.
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        use StepStatus::*;
        matches!(
            (self, next),
            (Executing, Succeeded)
                | (Executing, Failed)
                | (Succeeded, Compensated)
                | (Succeeded, CompensationFailed)
                | (Failed, Compensated)
                | (Failed, CompensationFailed)
        )
    }

    /// Returns true if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Compensated | StepStatus::CompensationFailed
        )
    }

    /// Returns true for the statuses produced by compensations.
    pub fn is_compensation(&self) -> bool {
        self.is_terminal()
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Executing => "EXECUTING",
            StepStatus::Succeeded => "SUCCEEDED",
            StepStatus::Failed => "FAILED",
            StepStatus::Compensated => "COMPENSATED",
            StepStatus::CompensationFailed => "COMPENSATION_FAILED",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal classification of a saga run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaOutcome {
    /// Every forward step succeeded.
    AllSucceeded,
    /// A step failed and every executed step was compensated.
    FullyCompensated,
    /// A step failed and at least one compensation failed.
    CompensationFailed,
}

impl SagaOutcome {
    /// Returns true if `(step, status)` ends a saga.
    ///
    /// A saga ends with either the payment succeeding or the inventory
    /// compensation reporting back, whatever its result.
    pub fn is_terminal_event(step: SagaStep, status: StepStatus) -> bool {
        matches!(
            (step, status),
            (SagaStep::CreatePayment, StepStatus::Succeeded)
                | (SagaStep::ReserveInventory, StepStatus::Compensated)
                | (SagaStep::ReserveInventory, StepStatus::CompensationFailed)
        )
    }

    /// Derives the outcome from a result history, or `None` while the saga
    /// is still running.
    pub fn from_history(history: &[(SagaStep, StepStatus)]) -> Option<SagaOutcome> {
        let &(step, status) = history
            .iter()
            .find(|(step, status)| Self::is_terminal_event(*step, *status))?;

        if step == SagaStep::CreatePayment {
            return Some(SagaOutcome::AllSucceeded);
        }

        let any_failed = history
            .iter()
            .any(|(_, s)| *s == StepStatus::CompensationFailed);
        debug_assert!(status.is_compensation());
        Some(if any_failed {
            SagaOutcome::CompensationFailed
        } else {
            SagaOutcome::FullyCompensated
        })
    }

    /// Returns the outcome name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaOutcome::AllSucceeded => "ALL_SUCCEEDED",
            SagaOutcome::FullyCompensated => "FULLY_COMPENSATED",
            SagaOutcome::CompensationFailed => "COMPENSATION_FAILED",
        }
    }
}

impl std::fmt::Display for SagaOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
