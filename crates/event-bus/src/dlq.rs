use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Message;

/// A message that could not be handled.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub message: Message,
    pub topic: String,
    pub handler_name: String,
    pub error: String,
    pub attempts: usize,
    pub failed_at: DateTime<Utc>,
}

/// Store of dead-lettered messages kept for operators.
#[derive(Clone, Default)]
pub struct DeadLetterQueue {
    entries: Arc<RwLock<Vec<DeadLetter>>>,
}

impl DeadLetterQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a dead letter.
    pub async fn push(&self, letter: DeadLetter) {
        let correlation_id = letter
            .message
            .correlation_id()
            .map(|c| c.to_string())
            .unwrap_or_default();
        tracing::error!(
            topic = %letter.topic,
            handler = %letter.handler_name,
            message_id = %letter.message.id,
            correlation_id = %correlation_id,
            attempts = letter.attempts,
            error = %letter.error,
            "Message dead-lettered"
        );
        metrics::counter!(
            "bus_messages_dead_lettered_total",
            "topic" => letter.topic.clone(),
            "handler" => letter.handler_name.clone()
        )
        .increment(1);

        self.entries.write().await.push(letter);
    }

    /// Returns all dead letters, oldest first.
    pub async fn list(&self) -> Vec<DeadLetter> {
        self.entries.read().await.clone()
    }

    /// Returns the number of dead letters.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if nothing has been dead-lettered.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
