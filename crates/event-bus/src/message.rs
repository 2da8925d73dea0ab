use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::CorrelationId;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{BusError, Result, TraceContext};

/// Metadata key carrying the saga correlation id.
pub const CORRELATION_ID_KEY: &str = "correlation-id";

/// Metadata key carrying the handler tag that identifies step and direction.
pub const HANDLER_KEY: &str = "handler";

/// Metadata key carrying the W3C `traceparent` value.
pub const TRACE_CONTEXT_KEY: &str = "trace-context";

/// Unique identifier for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message travelling over the bus.
///
/// The payload is opaque JSON; everything the transport itself needs lives
/// in the string metadata bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for this message. Redeliveries keep the same id.
    pub id: MessageId,

    /// Transport metadata (correlation id, handler tag, trace context).
    pub metadata: HashMap<String, String>,

    /// The message payload as JSON.
    pub payload: serde_json::Value,

    /// When the message was created.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Creates a new message builder.
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Returns the correlation id, if present.
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.metadata
            .get(CORRELATION_ID_KEY)
            .map(CorrelationId::from_string)
    }

    /// Returns the correlation id or a permanent error if it is missing.
    pub fn require_correlation_id(&self) -> Result<CorrelationId> {
        self.correlation_id()
            .ok_or(BusError::MissingMetadata(CORRELATION_ID_KEY))
    }

    /// Returns the raw handler tag, if present.
    pub fn handler(&self) -> Option<&str> {
        self.metadata.get(HANDLER_KEY).map(String::as_str)
    }

    /// Returns the trace context, if present.
    ///
    /// A malformed value comes back as an opaque context that is forwarded
    /// unchanged.
    pub fn trace_context(&self) -> Option<TraceContext> {
        TraceContext::extract(&self.metadata)
    }

    /// Returns a metadata value.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Sets a metadata value, replacing any previous value.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Deserializes the payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Builder for constructing messages.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    id: Option<MessageId>,
    created_at: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
    metadata: HashMap<String, String>,
}

impl MessageBuilder {
    /// Sets the message ID. If not set, a new ID will be generated.
    pub fn id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the creation time. If not set, the current time will be used.
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> std::result::Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the correlation id.
    pub fn correlation_id(self, id: &CorrelationId) -> Self {
        self.metadata(CORRELATION_ID_KEY, id.as_str())
    }

    /// Sets the handler tag.
    pub fn handler(self, handler: impl Into<String>) -> Self {
        self.metadata(HANDLER_KEY, handler)
    }

    /// Sets the trace context.
    pub fn trace_context(mut self, ctx: &TraceContext) -> Self {
        ctx.inject(&mut self.metadata);
        self
    }

    /// Adds a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Builds the message. A missing payload becomes JSON `null`.
    pub fn build(self) -> Message {
        Message {
            id: self.id.unwrap_or_default(),
            metadata: self.metadata,
            payload: self.payload.unwrap_or(serde_json::Value::Null),
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}
