//! Capped append-only streams.
//!
//! Each topic is a log of messages with monotonically increasing offsets
//! starting at 1. Once a topic holds `max_len` entries the oldest ones are
//! trimmed, so readers that fall behind can observe a gap between the offset
//! they asked for and the first entry they get back.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{RwLock, watch};

use crate::{Message, Publisher, Result};

/// Default maximum number of entries kept per topic.
pub const DEFAULT_MAX_LEN: usize = 5000;

/// One entry of a capped stream.
#[derive(Debug, Clone, Serialize)]
pub struct StreamEntry {
    pub offset: u64,
    pub message: Message,
}

#[derive(Default)]
struct TopicLog {
    entries: VecDeque<StreamEntry>,
    last_offset: u64,
}

/// A set of capped, append-only topic logs.
#[derive(Clone)]
pub struct CappedStream {
    topics: Arc<RwLock<HashMap<String, TopicLog>>>,
    max_len: usize,
    appended: Arc<watch::Sender<u64>>,
}

impl CappedStream {
    /// Creates a stream set that keeps at most `max_len` entries per topic.
    pub fn new(max_len: usize) -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            max_len: max_len.max(1),
            appended: Arc::new(appended),
        }
    }

    /// Returns the configured maximum length.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Appends a message and returns its offset.
    pub async fn append(&self, topic: &str, message: Message) -> u64 {
        let offset = {
            let mut topics = self.topics.write().await;
            let log = topics.entry(topic.to_string()).or_default();
            log.last_offset += 1;
            let offset = log.last_offset;
            log.entries.push_back(StreamEntry { offset, message });
            while log.entries.len() > self.max_len {
                log.entries.pop_front();
            }
            offset
        };

        self.appended.send_modify(|count| *count += 1);
        offset
    }

    /// Returns up to `limit` entries with an offset greater than `after`.
    pub async fn read_after(&self, topic: &str, after: u64, limit: usize) -> Vec<StreamEntry> {
        let topics = self.topics.read().await;
        let Some(log) = topics.get(topic) else {
            return Vec::new();
        };

        // Offsets are contiguous within the retained window
        let Some(first) = log.entries.front().map(|e| e.offset) else {
            return Vec::new();
        };
        let skip = after.saturating_sub(first - 1) as usize;

        log.entries.iter().skip(skip).take(limit).cloned().collect()
    }

    /// Returns the number of retained entries for a topic.
    pub async fn len(&self, topic: &str) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map_or(0, |log| log.entries.len())
    }

    /// Returns true if the topic has no retained entries.
    pub async fn is_empty(&self, topic: &str) -> bool {
        self.len(topic).await == 0
    }

    /// Returns the offset of the most recent entry, or 0 if none.
    pub async fn last_offset(&self, topic: &str) -> u64 {
        self.topics
            .read()
            .await
            .get(topic)
            .map_or(0, |log| log.last_offset)
    }

    /// Returns a receiver that changes whenever any topic is appended to.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.appended.subscribe()
    }
}

impl Default for CappedStream {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LEN)
    }
}

#[async_trait]
impl Publisher for CappedStream {
    async fn publish(&self, topic: &str, message: Message) -> Result<()> {
        self.append(topic, message).await;
        metrics::counter!("bus_messages_published_total", "topic" => topic.to_string())
            .increment(1);
        Ok(())
    }
}
