use std::sync::Arc;

use async_trait::async_trait;

use crate::{Message, Result};

/// Sends messages to a topic.
///
/// Implementations must be safe to share between tasks. Publishing gives no
/// ordering guarantee across topics.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes a message to the given topic.
    async fn publish(&self, topic: &str, message: Message) -> Result<()>;
}

#[async_trait]
impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    async fn publish(&self, topic: &str, message: Message) -> Result<()> {
        (**self).publish(topic, message).await
    }
}

/// Processes one inbound message and returns the messages it produces.
///
/// Returning an error asks the router to retry the same message; the
/// produced messages are only published once the handler succeeds.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message) -> Result<Vec<Message>>;
}

#[async_trait]
impl<H: MessageHandler + ?Sized> MessageHandler for Arc<H> {
    async fn handle(&self, message: Message) -> Result<Vec<Message>> {
        (**self).handle(message).await
    }
}
