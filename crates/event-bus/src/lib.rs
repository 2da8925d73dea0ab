//! Message transport for the purchase saga.
//!
//! Provides the message envelope and its metadata contract, an in-memory
//! at-least-once bus with consumer groups, a router that applies deadlines,
//! retries and dead-lettering to handlers, and capped streams used for the
//! externally visible result log.

pub mod dlq;
pub mod error;
pub mod memory;
pub mod message;
pub mod publisher;
pub mod router;
pub mod stream;
pub mod trace;

pub use dlq::{DeadLetter, DeadLetterQueue};
pub use error::{BusError, Result};
pub use memory::{InMemoryBus, Subscription};
pub use message::{
    CORRELATION_ID_KEY, HANDLER_KEY, Message, MessageBuilder, MessageId, TRACE_CONTEXT_KEY,
};
pub use publisher::{MessageHandler, Publisher};
pub use router::{Router, RouterConfig, RouterHandle};
pub use stream::{CappedStream, DEFAULT_MAX_LEN, StreamEntry};
pub use trace::TraceContext;
