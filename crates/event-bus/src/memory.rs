use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock, mpsc};

use crate::{BusError, Message, Publisher, Result};

/// In-memory topic bus with consumer-group semantics.
///
/// Every consumer group subscribed to a topic receives its own copy of each
/// message published after the group was created. Members of one group
/// share a queue, so each message is handed to exactly one member. Messages
/// published to a topic with no groups are dropped.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    state: Arc<RwLock<BusState>>,
}

#[derive(Default)]
struct BusState {
    topics: HashMap<String, HashMap<String, ConsumerGroup>>,
    published: HashMap<String, usize>,
    closed: bool,
}

struct ConsumerGroup {
    sender: mpsc::UnboundedSender<Message>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Message>>>,
}

impl InMemoryBus {
    /// Creates a new empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins `group` on `topic`, creating the group on first use.
    pub async fn subscribe(&self, topic: &str, group: &str) -> Result<Subscription> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(BusError::Closed);
        }

        let group_entry = state
            .topics
            .entry(topic.to_string())
            .or_default()
            .entry(group.to_string())
            .or_insert_with(|| {
                let (sender, receiver) = mpsc::unbounded_channel();
                ConsumerGroup {
                    sender,
                    receiver: Arc::new(Mutex::new(receiver)),
                }
            });

        Ok(Subscription {
            topic: topic.to_string(),
            group: group.to_string(),
            receiver: group_entry.receiver.clone(),
        })
    }

    /// Returns the number of messages published to a topic.
    pub async fn published_count(&self, topic: &str) -> usize {
        self.state
            .read()
            .await
            .published
            .get(topic)
            .copied()
            .unwrap_or(0)
    }

    /// Closes the bus. Subscriptions drain what is queued and then end.
    pub async fn close(&self) {
        let mut state = self.state.write().await;
        state.closed = true;
        state.topics.clear();
    }
}

#[async_trait]
impl Publisher for InMemoryBus {
    async fn publish(&self, topic: &str, message: Message) -> Result<()> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(BusError::Closed);
        }

        if let Some(groups) = state.topics.get(topic) {
            for (group, consumer) in groups {
                consumer
                    .sender
                    .send(message.clone())
                    .map_err(|_| BusError::Publish {
                        topic: topic.to_string(),
                        reason: format!("consumer group '{group}' is gone"),
                    })?;
            }
        } else {
            tracing::debug!(topic, message_id = %message.id, "No consumer groups for topic");
        }

        *state.published.entry(topic.to_string()).or_default() += 1;
        metrics::counter!("bus_messages_published_total", "topic" => topic.to_string())
            .increment(1);
        Ok(())
    }
}

/// A member of a consumer group.
///
/// Cloning a subscription adds another member to the same group.
#[derive(Clone)]
pub struct Subscription {
    topic: String,
    group: String,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Message>>>,
}

impl Subscription {
    /// Waits for the next message. Returns `None` once the bus is closed and
    /// the queue is drained.
    pub async fn recv(&self) -> Option<Message> {
        self.receiver.lock().await.recv().await
    }

    /// Returns the subscribed topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the consumer group name.
    pub fn group(&self) -> &str {
        &self.group
    }
}
