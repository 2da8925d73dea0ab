//! Purchase status read model: per-purchase saga progress for polling.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CorrelationId, PurchaseId, UserId};
use domain::{PurchaseResult, SagaOutcome, SagaStep, StepStatus};
use event_bus::StreamEntry;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

/// One entry of a purchase's step history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEvent {
    pub step: SagaStep,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
}

/// Saga progress of one purchase.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseStatus {
    pub purchase_id: PurchaseId,
    pub user_id: UserId,
    pub correlation_id: Option<CorrelationId>,
    /// Results in stream order, duplicates removed.
    pub history: Vec<StepEvent>,
    /// Latest status of each step that has started.
    pub steps: BTreeMap<SagaStep, StepStatus>,
    /// Set once a terminal result arrives.
    pub outcome: Option<SagaOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseStatus {
    fn new(result: &PurchaseResult, correlation_id: Option<CorrelationId>) -> Self {
        Self {
            purchase_id: result.purchase_id,
            user_id: result.user_id,
            correlation_id,
            history: Vec::new(),
            steps: BTreeMap::new(),
            outcome: None,
            created_at: result.timestamp,
            updated_at: result.timestamp,
        }
    }

    /// Returns true once the saga has reached a terminal outcome.
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    fn apply(&mut self, result: &PurchaseResult) {
        let seen = self
            .history
            .iter()
            .any(|e| e.step == result.step && e.status == result.status);
        if seen {
            tracing::debug!(
                purchase_id = %self.purchase_id,
                step = %result.step,
                status = %result.status,
                "Duplicate result ignored"
            );
            return;
        }

        if let Some(outcome) = self.outcome {
            tracing::warn!(
                purchase_id = %self.purchase_id,
                outcome = %outcome,
                step = %result.step,
                status = %result.status,
                "Result received after terminal outcome"
            );
        }

        if let Some(previous) = self.steps.get(&result.step) {
            if !previous.can_transition_to(result.status) {
                tracing::warn!(
                    purchase_id = %self.purchase_id,
                    step = %result.step,
                    from = %previous,
                    to = %result.status,
                    "Unexpected step transition"
                );
            }
        }

        self.history.push(StepEvent {
            step: result.step,
            status: result.status,
            timestamp: result.timestamp,
        });
        self.steps.insert(result.step, result.status);
        self.updated_at = self.updated_at.max(result.timestamp);

        if self.outcome.is_none() {
            let history: Vec<_> = self.history.iter().map(|e| (e.step, e.status)).collect();
            self.outcome = SagaOutcome::from_history(&history);
        }
    }
}

/// Read model of every purchase's saga progress, keyed on purchase id.
#[derive(Clone, Default)]
pub struct PurchaseStatusView {
    purchases: Arc<RwLock<HashMap<PurchaseId, PurchaseStatus>>>,
    position: Arc<RwLock<ProjectionPosition>>,
}

impl PurchaseStatusView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the status of a purchase.
    pub async fn get(&self, purchase_id: PurchaseId) -> Option<PurchaseStatus> {
        self.purchases.read().await.get(&purchase_id).cloned()
    }

    /// Gets every purchase of a user, most recent first.
    pub async fn by_user(&self, user_id: UserId) -> Vec<PurchaseStatus> {
        let mut purchases: Vec<_> = self
            .purchases
            .read()
            .await
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        purchases.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        purchases
    }

    /// Gets purchases whose saga has not finished yet.
    pub async fn in_flight(&self) -> Vec<PurchaseStatus> {
        self.purchases
            .read()
            .await
            .values()
            .filter(|p| !p.is_finished())
            .cloned()
            .collect()
    }

    /// Counts finished purchases per outcome.
    pub async fn outcome_counts(&self) -> HashMap<SagaOutcome, usize> {
        let mut counts = HashMap::new();
        for outcome in self.purchases.read().await.values().filter_map(|p| p.outcome) {
            *counts.entry(outcome).or_insert(0) += 1;
        }
        counts
    }
}

#[async_trait]
impl Projection for PurchaseStatusView {
    fn name(&self) -> &'static str {
        "PurchaseStatusView"
    }

    async fn handle(&self, entry: &StreamEntry) -> Result<()> {
        let result: PurchaseResult = entry.message.decode()?;

        {
            let mut purchases = self.purchases.write().await;
            let status = purchases
                .entry(result.purchase_id)
                .or_insert_with(|| PurchaseStatus::new(&result, entry.message.correlation_id()));
            let was_finished = status.is_finished();
            status.apply(&result);

            if !was_finished {
                if let Some(outcome) = status.outcome {
                    metrics::counter!("purchases_finished_total", "outcome" => outcome.as_str())
                        .increment(1);
                    tracing::info!(
                        purchase_id = %result.purchase_id,
                        outcome = %outcome,
                        "Purchase finished"
                    );
                }
            }
        }

        *self.position.write().await = ProjectionPosition::at(entry.offset);
        Ok(())
    }

    async fn skip(&self, entry: &StreamEntry) {
        *self.position.write().await = ProjectionPosition::at(entry.offset);
    }

    async fn position(&self) -> ProjectionPosition {
        *self.position.read().await
    }

    async fn reset(&self) -> Result<()> {
        self.purchases.write().await.clear();
        *self.position.write().await = ProjectionPosition::zero();
        Ok(())
    }
}

impl ReadModel for PurchaseStatusView {
    fn name(&self) -> &'static str {
        "PurchaseStatusView"
    }

    fn count(&self) -> usize {
        // Use try_read to avoid blocking; returns 0 if lock is held
        self.purchases.try_read().map(|p| p.len()).unwrap_or(0)
    }
}
