//! Projection processor for feeding stream entries to projections.

use event_bus::{CappedStream, StreamEntry};
use tokio::sync::watch;

use crate::Result;
use crate::projection::Projection;

/// Entries read per batch during catch-up.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Delivers entries of one capped stream topic to projections.
///
/// The processor supports:
/// - Catch-up: reads every entry after each projection's position
/// - Tailing: repeats catch-up whenever the stream is appended to
/// - Rebuild: resets all projections and replays the retained entries
///
/// The stream is capped, so a projection that falls further behind than
/// the stream's max length misses entries. Such gaps are logged and counted.
pub struct ProjectionProcessor {
    stream: CappedStream,
    topic: String,
    batch_size: usize,
    projections: Vec<Box<dyn Projection>>,
}

impl ProjectionProcessor {
    /// Creates a processor reading `topic` from `stream`.
    pub fn new(stream: CappedStream, topic: impl Into<String>) -> Self {
        Self {
            stream,
            topic: topic.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            projections: Vec::new(),
        }
    }

    /// Sets the number of entries read per batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Registers a projection with this processor.
    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Returns the number of registered projections.
    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Brings every projection up to the end of the stream.
    ///
    /// Returns the number of entries applied across all projections.
    #[tracing::instrument(skip(self), fields(topic = %self.topic))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let mut applied = 0;
        for projection in &self.projections {
            applied += self.catch_up(projection.as_ref()).await?;
        }
        if applied > 0 {
            tracing::debug!(entries_applied = applied, "catch-up complete");
        }
        Ok(applied)
    }

    async fn catch_up(&self, projection: &dyn Projection) -> Result<u64> {
        let mut applied = 0;
        loop {
            let position = projection.position().await;
            let batch = self
                .stream
                .read_after(&self.topic, position.offset, self.batch_size)
                .await;
            let Some(first) = batch.first() else {
                return Ok(applied);
            };

            if first.offset > position.offset + 1 {
                let missed = first.offset - position.offset - 1;
                metrics::counter!("projections_entries_missed_total", "projection" => projection.name())
                    .increment(missed);
                tracing::warn!(
                    projection = projection.name(),
                    position = %position,
                    first_retained = first.offset,
                    missed,
                    "Stream was trimmed past the projection position"
                );
            }

            for entry in &batch {
                if apply(projection, entry).await {
                    applied += 1;
                }
            }
        }
    }

    /// Delivers a single entry to every projection that has not seen it.
    #[tracing::instrument(skip(self, entry), fields(offset = entry.offset))]
    pub async fn process_entry(&self, entry: &StreamEntry) -> Result<()> {
        for projection in &self.projections {
            if projection.position().await.is_behind(entry.offset) {
                apply(projection.as_ref(), entry).await;
            }
        }
        Ok(())
    }

    /// Resets all projections and replays the retained entries.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        for projection in &self.projections {
            projection.reset().await?;
        }
        self.run_catch_up().await
    }

    /// Catches up, then follows the stream until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut appended = self.stream.watch();
        tracing::info!(
            topic = %self.topic,
            projections = self.projections.len(),
            "Projection processor started"
        );

        loop {
            if let Err(e) = self.run_catch_up().await {
                tracing::error!(topic = %self.topic, error = %e, "Projection catch-up failed");
            }

            tokio::select! {
                changed = appended.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!(topic = %self.topic, "Projection processor stopped");
    }
}

/// Applies one entry, skipping past it if the projection rejects it.
///
/// Returns whether the entry was applied.
async fn apply(projection: &dyn Projection, entry: &StreamEntry) -> bool {
    match projection.handle(entry).await {
        Ok(()) => {
            metrics::counter!("projections_entries_processed_total", "projection" => projection.name())
                .increment(1);
            true
        }
        Err(e) => {
            metrics::counter!("projections_entries_skipped_total", "projection" => projection.name())
                .increment(1);
            tracing::warn!(
                projection = projection.name(),
                offset = entry.offset,
                message_id = %entry.message.id,
                error = %e,
                "Skipping entry the projection cannot apply"
            );
            projection.skip(entry).await;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use event_bus::Message;
    use tokio::sync::RwLock;

    use super::*;
    use crate::projection::ProjectionPosition;

    /// Records the offsets it sees.
    #[derive(Clone, Default)]
    struct RecordingProjection {
        seen: Arc<RwLock<Vec<u64>>>,
        position: Arc<RwLock<ProjectionPosition>>,
    }

    #[async_trait]
    impl Projection for RecordingProjection {
        fn name(&self) -> &'static str {
            "RecordingProjection"
        }

        async fn handle(&self, entry: &StreamEntry) -> Result<()> {
            self.seen.write().await.push(entry.offset);
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
            self.seen.write().await.clear();
            *self.position.write().await = ProjectionPosition::zero();
            Ok(())
        }
    }

    async fn stream_with(max_len: usize, entries: usize) -> CappedStream {
        let stream = CappedStream::new(max_len);
        for n in 0..entries {
            stream
                .append(
                    "results",
                    Message::builder().payload_raw(serde_json::json!({ "n": n })).build(),
                )
                .await;
        }
        stream
    }

    #[tokio::test]
    async fn catch_up_reads_in_batches() {
        let stream = stream_with(100, 7).await;
        let projection = RecordingProjection::default();
        let mut processor = ProjectionProcessor::new(stream, "results").with_batch_size(3);
        processor.register(Box::new(projection.clone()));

        assert_eq!(processor.run_catch_up().await.unwrap(), 7);
        assert_eq!(*projection.seen.read().await, vec![1, 2, 3, 4, 5, 6, 7]);

        // Nothing new: nothing applied.
        assert_eq!(processor.run_catch_up().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn trimmed_entries_are_skipped() {
        let stream = stream_with(3, 5).await;
        let projection = RecordingProjection::default();
        let mut processor = ProjectionProcessor::new(stream, "results");
        processor.register(Box::new(projection.clone()));

        processor.run_catch_up().await.unwrap();
        assert_eq!(*projection.seen.read().await, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn process_entry_skips_seen_offsets() {
        let stream = stream_with(10, 2).await;
        let projection = RecordingProjection::default();
        let mut processor = ProjectionProcessor::new(stream.clone(), "results");
        processor.register(Box::new(projection.clone()));
        processor.run_catch_up().await.unwrap();

        let entries = stream.read_after("results", 0, 10).await;
        processor.process_entry(&entries[1]).await.unwrap();
        assert_eq!(*projection.seen.read().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn rebuild_replays_from_scratch() {
        let stream = stream_with(10, 4).await;
        let projection = RecordingProjection::default();
        let mut processor = ProjectionProcessor::new(stream, "results");
        processor.register(Box::new(projection.clone()));

        processor.run_catch_up().await.unwrap();
        assert_eq!(processor.rebuild_all().await.unwrap(), 4);
        assert_eq!(projection.seen.read().await.len(), 4);
    }

    #[tokio::test]
    async fn run_tails_until_shutdown() {
        let stream = stream_with(10, 1).await;
        let projection = RecordingProjection::default();
        let mut processor = ProjectionProcessor::new(stream.clone(), "results");
        processor.register(Box::new(projection.clone()));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(processor.run(shutdown_rx));

        stream
            .append("results", Message::builder().build())
            .await;
        for _ in 0..100 {
            if projection.position().await.offset == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(projection.position().await, ProjectionPosition::at(2));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
