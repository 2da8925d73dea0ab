//! Orchestrated saga for purchases.
//!
//! A purchase runs three steps in a fixed order:
//! 1. Reserve inventory
//! 2. Create the order
//! 3. Create the payment
//!
//! If a step fails, the steps that ran are compensated in reverse order.
//! The orchestrator is stateless: each reply carries everything needed to
//! pick the next action, and progress is published to the
//! `purchase.result` stream.

pub mod error;
pub mod orchestrator;
pub mod participants;
pub mod reply;
pub mod result;
pub mod runtime;

pub use error::{Result, SagaError};
pub use orchestrator::SagaOrchestrator;
pub use participants::{
    Direction, InMemoryOrderRepository, InMemoryPaymentRepository, InventoryParticipant,
    OrderParticipant, OrderRepository, Participant, ParticipantHandler, PaymentParticipant,
    PaymentRecord, PaymentRepository, StepOutcome,
};
pub use reply::Reply;
pub use result::ResultPublisher;
pub use runtime::{
    ORCHESTRATOR_GROUP, SagaReplyHandler, StartSagaHandler, register_orchestrator,
    register_participant, register_saga,
};
