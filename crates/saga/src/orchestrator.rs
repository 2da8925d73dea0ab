//! Reactive saga orchestrator.
//!
//! The orchestrator keeps no state between messages. Every decision is taken
//! from the incoming message alone:
//!
//! ```text
//! forward success S  ─► S:Succeeded, N:Executing, publish N command
//! forward success P  ─► P:Succeeded (terminal)
//! forward failure S  ─► S:Failed, publish S compensation
//! compensation S     ─► S:Compensated | S:CompensationFailed,
//!                       publish compensation of S's predecessor (if any)
//! ```

use common::{CorrelationId, PurchaseId, UserId};
use domain::{
    Purchase, PurchaseCommand, PurchaseReply, RollbackCommand, RollbackReply, SagaStep, StepStatus,
};
use event_bus::{Message, Publisher, TraceContext};
use tracing::{info, warn};

use crate::reply::Reply;
use crate::result::ResultPublisher;
use crate::Result;

/// Drives purchases through the saga steps.
pub struct SagaOrchestrator<C: Publisher, R: Publisher> {
    commands: C,
    results: ResultPublisher<R>,
}

impl<C: Publisher, R: Publisher> SagaOrchestrator<C, R> {
    /// Creates an orchestrator publishing commands to `commands` and
    /// progress to `results`.
    pub fn new(commands: C, results: R) -> Self {
        Self {
            commands,
            results: ResultPublisher::new(results),
        }
    }

    /// Starts the saga for a new purchase.
    #[tracing::instrument(skip(self, purchase, correlation_id, trace), fields(purchase_id = %purchase.id, correlation_id = %correlation_id))]
    pub async fn start_saga(
        &self,
        purchase: &Purchase,
        correlation_id: &CorrelationId,
        trace: Option<TraceContext>,
    ) -> Result<()> {
        metrics::counter!("saga_started_total").increment(1);
        if let Some(parent) = &trace {
            parent.attach(&tracing::Span::current());
        }
        let trace = child_of(trace);
        let first = SagaStep::first();

        self.results
            .publish(
                correlation_id,
                purchase.user_id(),
                purchase.id,
                first,
                StepStatus::Executing,
            )
            .await;
        self.send_command(first, purchase, correlation_id, &trace)
            .await?;

        info!(step = %first, "Saga started");
        Ok(())
    }

    /// Handles a participant reply.
    #[tracing::instrument(skip(self, message), fields(message_id = %message.id))]
    pub async fn handle_reply(&self, message: &Message) -> Result<()> {
        let correlation_id = message.require_correlation_id()?;
        let inbound = message.trace_context();
        if let Some(parent) = &inbound {
            parent.attach(&tracing::Span::current());
        }
        let trace = child_of(inbound);
        let reply = Reply::decode(message)?;

        metrics::counter!(
            "saga_replies_total",
            "handler" => reply.handler().as_str(),
            "success" => if reply.success() { "true" } else { "false" }
        )
        .increment(1);

        match reply {
            Reply::Forward { handler, reply } => {
                self.on_forward_reply(handler.step(), reply, &correlation_id, &trace)
                    .await
            }
            Reply::Compensation { handler, reply } => {
                self.on_compensation_reply(handler.step(), reply, &correlation_id, &trace)
                    .await
            }
        }
    }

    #[tracing::instrument(skip(self, reply, correlation_id, trace), fields(purchase_id = %reply.purchase_id, correlation_id = %correlation_id, trace_id = %trace.trace_id()))]
    async fn on_forward_reply(
        &self,
        step: SagaStep,
        reply: PurchaseReply,
        correlation_id: &CorrelationId,
        trace: &TraceContext,
    ) -> Result<()> {
        let purchase = reply.purchase();
        let user_id = purchase.user_id();

        if !reply.success {
            warn!(
                error = reply.error.as_deref().unwrap_or_default(),
                "Step failed, compensating"
            );
            self.results
                .publish(correlation_id, user_id, purchase.id, step, StepStatus::Failed)
                .await;
            return self
                .send_compensation(step, purchase.id, user_id, correlation_id, trace)
                .await;
        }

        self.results
            .publish(correlation_id, user_id, purchase.id, step, StepStatus::Succeeded)
            .await;

        match step.next() {
            Some(next) => {
                self.results
                    .publish(correlation_id, user_id, purchase.id, next, StepStatus::Executing)
                    .await;
                self.send_command(next, &purchase, correlation_id, trace)
                    .await
            }
            None => {
                info!("Saga completed");
                Ok(())
            }
        }
    }

    #[tracing::instrument(skip(self, reply, correlation_id, trace), fields(purchase_id = %reply.purchase_id, correlation_id = %correlation_id, trace_id = %trace.trace_id()))]
    async fn on_compensation_reply(
        &self,
        step: SagaStep,
        reply: RollbackReply,
        correlation_id: &CorrelationId,
        trace: &TraceContext,
    ) -> Result<()> {
        let status = if reply.success {
            StepStatus::Compensated
        } else {
            warn!(
                error = reply.error.as_deref().unwrap_or_default(),
                "Compensation failed"
            );
            StepStatus::CompensationFailed
        };
        self.results
            .publish(correlation_id, reply.user_id, reply.purchase_id, step, status)
            .await;

        match step.previous() {
            Some(previous) => {
                self.send_compensation(
                    previous,
                    reply.purchase_id,
                    reply.user_id,
                    correlation_id,
                    trace,
                )
                .await
            }
            None => {
                info!("Saga rolled back");
                Ok(())
            }
        }
    }

    async fn send_command(
        &self,
        step: SagaStep,
        purchase: &Purchase,
        correlation_id: &CorrelationId,
        trace: &TraceContext,
    ) -> Result<()> {
        let message = Message::builder()
            .payload(&PurchaseCommand::new(purchase))?
            .correlation_id(correlation_id)
            .trace_context(trace)
            .build();
        self.commands.publish(step.command_topic(), message).await?;
        Ok(())
    }

    async fn send_compensation(
        &self,
        step: SagaStep,
        purchase_id: PurchaseId,
        user_id: UserId,
        correlation_id: &CorrelationId,
        trace: &TraceContext,
    ) -> Result<()> {
        let message = Message::builder()
            .payload(&RollbackCommand::new(purchase_id, user_id))?
            .correlation_id(correlation_id)
            .trace_context(trace)
            .build();
        self.commands
            .publish(step.compensation_topic(), message)
            .await?;
        Ok(())
    }
}

/// Continues the inbound trace, or starts a new one when none was propagated.
pub(crate) fn child_of(trace: Option<TraceContext>) -> TraceContext {
    trace
        .map(|t| t.child())
        .unwrap_or_else(TraceContext::new_root)
}
