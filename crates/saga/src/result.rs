use common::{CorrelationId, PurchaseId, UserId};
use domain::{PurchaseResult, SagaStep, StepStatus, topics};
use event_bus::{Message, Publisher};

/// Publishes step-by-step saga progress to the purchase result stream.
///
/// Failures are logged and counted but never propagated: the result stream
/// is for observers and must not block the saga.
pub struct ResultPublisher<R: Publisher> {
    stream: R,
}

impl<R: Publisher> ResultPublisher<R> {
    /// Creates a result publisher writing to `stream`.
    pub fn new(stream: R) -> Self {
        Self { stream }
    }

    /// Publishes one `(step, status)` result.
    pub async fn publish(
        &self,
        correlation_id: &CorrelationId,
        user_id: UserId,
        purchase_id: PurchaseId,
        step: SagaStep,
        status: StepStatus,
    ) {
        let result = PurchaseResult::new(user_id, purchase_id, step, status);
        let message = match Message::builder().payload(&result) {
            Ok(builder) => builder.correlation_id(correlation_id).build(),
            Err(e) => {
                self.record_failure(purchase_id, step, status, &e);
                return;
            }
        };

        match self.stream.publish(topics::PURCHASE_RESULT, message).await {
            Ok(()) => tracing::debug!(
                purchase_id = %purchase_id,
                step = %step,
                status = %status,
                "Result published"
            ),
            Err(e) => self.record_failure(purchase_id, step, status, &e),
        }
    }

    fn record_failure(
        &self,
        purchase_id: PurchaseId,
        step: SagaStep,
        status: StepStatus,
        error: &dyn std::fmt::Display,
    ) {
        metrics::counter!("saga_result_publish_failures_total").increment(1);
        tracing::error!(
            purchase_id = %purchase_id,
            step = %step,
            status = %status,
            error = %error,
            "Failed to publish purchase result"
        );
    }
}
