//! Wires the orchestrator and the participants onto a message router.
//!
//! ```text
//! purchase.start ──► [orchestrator] ──► inventory.reserve ──► [inventory] ─┐
//!                                   ──► order.create      ──► [order]     ─┼─► reply
//!                                   ──► payment.create    ──► [payment]   ─┘     │
//!        ▲                                                                       │
//!        └───────────────────────────── [orchestrator] ◄─────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use domain::{PurchaseCommand, SagaStep, topics};
use event_bus::{Message, MessageHandler, Publisher, Router};

use crate::orchestrator::SagaOrchestrator;
use crate::participants::{Direction, Participant, ParticipantHandler};

/// Consumer group of the orchestrator handlers.
pub const ORCHESTRATOR_GROUP: &str = "orchestrator";

/// Starts a saga for every purchase published to `purchase.start`.
pub struct StartSagaHandler<C: Publisher, R: Publisher> {
    orchestrator: Arc<SagaOrchestrator<C, R>>,
}

impl<C: Publisher, R: Publisher> StartSagaHandler<C, R> {
    pub fn new(orchestrator: Arc<SagaOrchestrator<C, R>>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl<C: Publisher, R: Publisher> MessageHandler for StartSagaHandler<C, R> {
    async fn handle(&self, message: Message) -> event_bus::Result<Vec<Message>> {
        let correlation_id = message.require_correlation_id()?;
        let command: PurchaseCommand = message.decode()?;
        self.orchestrator
            .start_saga(
                &command.into_purchase(),
                &correlation_id,
                message.trace_context(),
            )
            .await?;
        Ok(Vec::new())
    }
}

/// Feeds participant replies to the orchestrator.
pub struct SagaReplyHandler<C: Publisher, R: Publisher> {
    orchestrator: Arc<SagaOrchestrator<C, R>>,
}

impl<C: Publisher, R: Publisher> SagaReplyHandler<C, R> {
    pub fn new(orchestrator: Arc<SagaOrchestrator<C, R>>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl<C: Publisher, R: Publisher> MessageHandler for SagaReplyHandler<C, R> {
    async fn handle(&self, message: Message) -> event_bus::Result<Vec<Message>> {
        self.orchestrator.handle_reply(&message).await?;
        Ok(Vec::new())
    }
}

/// Registers the orchestrator handlers.
pub fn register_orchestrator<C, R>(router: &mut Router, orchestrator: Arc<SagaOrchestrator<C, R>>)
where
    C: Publisher + 'static,
    R: Publisher + 'static,
{
    router
        .add_handler(
            "start-saga",
            topics::PURCHASE_START,
            ORCHESTRATOR_GROUP,
            None,
            Arc::new(StartSagaHandler::new(orchestrator.clone())),
        )
        .add_handler(
            "saga-reply",
            topics::REPLY,
            ORCHESTRATOR_GROUP,
            None,
            Arc::new(SagaReplyHandler::new(orchestrator)),
        );
}

/// Registers both directions of a participant. Replies go to `reply`.
pub fn register_participant<P>(router: &mut Router, participant: P)
where
    P: Participant + 'static,
{
    let participant = Arc::new(participant);
    let group = participant_group(participant.step());

    for direction in [Direction::Forward, Direction::Compensation] {
        let handler = ParticipantHandler::new(participant.clone(), direction);
        router.add_handler(
            handler.tag().as_str(),
            handler.topic(),
            group,
            Some(topics::REPLY),
            Arc::new(handler),
        );
    }
}

fn participant_group(step: SagaStep) -> &'static str {
    match step {
        SagaStep::ReserveInventory => "inventory",
        SagaStep::CreateOrder => "order",
        SagaStep::CreatePayment => "payment",
    }
}

/// Registers the orchestrator and the three step participants.
pub fn register_saga<C, R, I, O, P>(
    router: &mut Router,
    orchestrator: Arc<SagaOrchestrator<C, R>>,
    inventory: I,
    order: O,
    payment: P,
) where
    C: Publisher + 'static,
    R: Publisher + 'static,
    I: Participant + 'static,
    O: Participant + 'static,
    P: Participant + 'static,
{
    register_orchestrator(router, orchestrator);
    register_participant(router, inventory);
    register_participant(router, order);
    register_participant(router, payment);
}
