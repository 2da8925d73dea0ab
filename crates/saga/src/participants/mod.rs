//! Saga step participants.
//!
//! A participant performs one step of the purchase saga and knows how to undo
//! it. `ParticipantHandler` adapts a participant to the message router: it
//! decodes the command, runs the step (or its compensation) and turns the
//! outcome into a tagged reply for the orchestrator.

pub mod inventory;
pub mod order;
pub mod payment;

pub use inventory::InventoryParticipant;
pub use order::{InMemoryOrderRepository, OrderParticipant, OrderRepository};
pub use payment::{InMemoryPaymentRepository, PaymentParticipant, PaymentRecord, PaymentRepository};

use std::sync::Arc;

use async_trait::async_trait;
use common::PurchaseId;
use domain::{
    Handler, Purchase, PurchaseCommand, PurchaseReply, RollbackCommand, RollbackReply, SagaStep,
};
use event_bus::{BusError, Message, MessageHandler};
use tracing::{Instrument, info, warn};

use crate::Result;
use crate::orchestrator::child_of;

/// What a forward step found when it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step is in place, either now or from an earlier delivery.
    Applied,
    /// The step was already compensated. The command is stale and gets no
    /// reply, so a finished saga is never restarted.
    Compensated,
}

/// One step of the purchase saga.
///
/// Both operations must tolerate redelivery of the same purchase, in any
/// order relative to each other.
#[async_trait]
pub trait Participant: Send + Sync {
    /// The step this participant performs.
    fn step(&self) -> SagaStep;

    /// Performs the step for the purchase.
    async fn execute(&self, purchase: &Purchase) -> Result<StepOutcome>;

    /// Undoes the step. Undoing a step that never happened succeeds.
    async fn compensate(&self, purchase_id: PurchaseId) -> Result<()>;
}

#[async_trait]
impl<P: Participant + ?Sized> Participant for Arc<P> {
    fn step(&self) -> SagaStep {
        (**self).step()
    }

    async fn execute(&self, purchase: &Purchase) -> Result<StepOutcome> {
        (**self).execute(purchase).await
    }

    async fn compensate(&self, purchase_id: PurchaseId) -> Result<()> {
        (**self).compensate(purchase_id).await
    }
}

/// Which side of a participant a handler drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Compensation,
}

/// Router handler that drives a participant in one direction.
pub struct ParticipantHandler<P: Participant> {
    participant: P,
    direction: Direction,
}

impl<P: Participant> ParticipantHandler<P> {
    pub fn new(participant: P, direction: Direction) -> Self {
        Self {
            participant,
            direction,
        }
    }

    /// Handler tag attached to the replies.
    pub fn tag(&self) -> Handler {
        match self.direction {
            Direction::Forward => self.participant.step().forward_handler(),
            Direction::Compensation => self.participant.step().compensation_handler(),
        }
    }

    /// Topic the handler consumes.
    pub fn topic(&self) -> &'static str {
        match self.direction {
            Direction::Forward => self.participant.step().command_topic(),
            Direction::Compensation => self.participant.step().compensation_topic(),
        }
    }

    async fn execute(&self, command: PurchaseCommand) -> Result<Option<serde_json::Value>> {
        let purchase = command.into_purchase();
        let step = self.participant.step();
        let reply = match self.participant.execute(&purchase).await {
            Ok(StepOutcome::Applied) => {
                info!(purchase_id = %purchase.id, step = %step, "Step completed");
                PurchaseReply::success(&purchase)
            }
            Ok(StepOutcome::Compensated) => {
                info!(
                    purchase_id = %purchase.id,
                    step = %step,
                    "Step already compensated, dropping stale command"
                );
                return Ok(None);
            }
            Err(e) => {
                warn!(
                    purchase_id = %purchase.id,
                    step = %step,
                    error = %e,
                    "Step failed"
                );
                PurchaseReply::failure(&purchase, e.to_string())
            }
        };
        Ok(Some(serde_json::to_value(reply)?))
    }

    async fn compensate(&self, command: RollbackCommand) -> Result<Option<serde_json::Value>> {
        let step = self.participant.step();
        let reply = match self.participant.compensate(command.purchase_id).await {
            Ok(()) => {
                info!(purchase_id = %command.purchase_id, step = %step, "Step compensated");
                RollbackReply::success(&command)
            }
            Err(e) => {
                warn!(
                    purchase_id = %command.purchase_id,
                    step = %step,
                    error = %e,
                    "Compensation failed"
                );
                RollbackReply::failure(&command, e.to_string())
            }
        };
        Ok(Some(serde_json::to_value(reply)?))
    }
}

#[async_trait]
impl<P: Participant> MessageHandler for ParticipantHandler<P> {
    async fn handle(&self, message: Message) -> event_bus::Result<Vec<Message>> {
        let correlation_id = message.require_correlation_id()?;
        let inbound = message.trace_context();
        let trace = child_of(inbound.clone());
        let tag = self.tag();

        let span = tracing::info_span!(
            "participant",
            handler = %tag,
            correlation_id = %correlation_id,
            trace_id = %trace.trace_id()
        );
        if let Some(parent) = &inbound {
            parent.attach(&span);
        }

        // Participant errors end up in the reply; only malformed input is
        // reported back to the router.
        let payload = async {
            let payload = match self.direction {
                Direction::Forward => self.execute(message.decode()?).await?,
                Direction::Compensation => self.compensate(message.decode()?).await?,
            };
            Ok::<_, BusError>(payload)
        }
        .instrument(span)
        .await?;

        let Some(payload) = payload else {
            return Ok(Vec::new());
        };
        Ok(vec![
            Message::builder()
                .payload_raw(payload)
                .handler(tag.as_str())
                .correlation_id(&correlation_id)
                .trace_context(&trace)
                .build(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use common::{CorrelationId, UserId};
    use domain::{Money, Order, Payment, PurchasedItem};
    use event_bus::{HANDLER_KEY, TRACE_CONTEXT_KEY, TraceContext};

    use super::*;
    use crate::SagaError;

    #[derive(Default)]
    struct Toggle {
        fail: AtomicBool,
        compensated: AtomicBool,
    }

    #[async_trait]
    impl Participant for Toggle {
        fn step(&self) -> SagaStep {
            SagaStep::CreateOrder
        }

        async fn execute(&self, _purchase: &Purchase) -> Result<StepOutcome> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SagaError::StepFailed {
                    step: SagaStep::CreateOrder,
                    reason: "order store unavailable".into(),
                });
            }
            if self.compensated.load(Ordering::SeqCst) {
                return Ok(StepOutcome::Compensated);
            }
            Ok(StepOutcome::Applied)
        }

        async fn compensate(&self, _purchase_id: PurchaseId) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SagaError::CompensationFailed {
                    step: SagaStep::CreateOrder,
                    reason: "order store unavailable".into(),
                });
            }
            Ok(())
        }
    }

    fn purchase() -> Purchase {
        Purchase {
            id: PurchaseId::new(11),
            order: Order {
                user_id: UserId::new(3),
                items: vec![PurchasedItem::new(1u64, 1)],
            },
            payment: Payment {
                currency_code: "EUR".into(),
                amount: Money::from_minor(250),
            },
        }
    }

    fn command_message(correlation_id: &CorrelationId, trace: &TraceContext) -> Message {
        Message::builder()
            .payload(&PurchaseCommand::new(&purchase()))
            .unwrap()
            .correlation_id(correlation_id)
            .trace_context(trace)
            .build()
    }

    #[tokio::test]
    async fn forward_success_replies_with_tag_and_context() {
        let handler = ParticipantHandler::new(Toggle::default(), Direction::Forward);
        let correlation_id = CorrelationId::new();
        let trace = TraceContext::new_root();

        let out = handler
            .handle(command_message(&correlation_id, &trace))
            .await
            .unwrap();

        assert_eq!(out.len(), 1);
        let reply = &out[0];
        assert_eq!(reply.metadata(HANDLER_KEY), Some("create-order"));
        assert_eq!(reply.correlation_id(), Some(correlation_id));
        assert_eq!(reply.trace_context().unwrap().trace_id(), trace.trace_id());

        let body: PurchaseReply = reply.decode().unwrap();
        assert!(body.success);
        assert_eq!(body.purchase(), purchase());
    }

    #[tokio::test]
    async fn unparseable_trace_context_is_forwarded_unchanged() {
        let handler = ParticipantHandler::new(Toggle::default(), Direction::Forward);
        let message = Message::builder()
            .payload(&PurchaseCommand::new(&purchase()))
            .unwrap()
            .correlation_id(&CorrelationId::new())
            .metadata(TRACE_CONTEXT_KEY, "vendor-trace-42")
            .build();

        let out = handler.handle(message).await.unwrap();

        assert_eq!(out[0].metadata(TRACE_CONTEXT_KEY), Some("vendor-trace-42"));
    }

    #[tokio::test]
    async fn forward_failure_becomes_failure_reply() {
        let handler = ParticipantHandler::new(Toggle::default(), Direction::Forward);
        handler.participant.fail.store(true, Ordering::SeqCst);

        let out = handler
            .handle(command_message(&CorrelationId::new(), &TraceContext::new_root()))
            .await
            .unwrap();

        let body: PurchaseReply = out[0].decode().unwrap();
        assert!(!body.success);
        assert!(body.error.unwrap().contains("order store unavailable"));
    }

    #[tokio::test]
    async fn stale_command_after_compensation_gets_no_reply() {
        let handler = ParticipantHandler::new(Toggle::default(), Direction::Forward);
        handler.participant.compensated.store(true, Ordering::SeqCst);

        let out = handler
            .handle(command_message(&CorrelationId::new(), &TraceContext::new_root()))
            .await
            .unwrap();

        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn compensation_failure_becomes_failure_reply() {
        let handler = ParticipantHandler::new(Toggle::default(), Direction::Compensation);
        handler.participant.fail.store(true, Ordering::SeqCst);
        let message = Message::builder()
            .payload(&RollbackCommand::new(PurchaseId::new(11), UserId::new(3)))
            .unwrap()
            .correlation_id(&CorrelationId::new())
            .build();

        let out = handler.handle(message).await.unwrap();

        assert_eq!(out[0].metadata(HANDLER_KEY), Some("rollback-order"));
        let body: RollbackReply = out[0].decode().unwrap();
        assert!(!body.success);
        assert_eq!(body.user_id, UserId::new(3));
    }

    #[tokio::test]
    async fn malformed_commands_are_permanent_errors() {
        let handler = ParticipantHandler::new(Toggle::default(), Direction::Forward);
        let message = Message::builder()
            .payload_raw(serde_json::json!({"purchaseId": "nope"}))
            .correlation_id(&CorrelationId::new())
            .build();

        let err = handler.handle(message).await.unwrap_err();
        assert!(matches!(err, BusError::Serialization(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn commands_without_correlation_id_are_rejected() {
        let handler = ParticipantHandler::new(Toggle::default(), Direction::Forward);
        let message = Message::builder()
            .payload(&PurchaseCommand::new(&purchase()))
            .unwrap()
            .build();

        let err = handler.handle(message).await.unwrap_err();
        assert!(matches!(err, BusError::MissingMetadata(_)));
    }
}
