//! Core projection trait and position tracking.

use async_trait::async_trait;
use event_bus::StreamEntry;

use crate::Result;

/// Offset of the last stream entry a projection has applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProjectionPosition {
    pub offset: u64,
}

impl ProjectionPosition {
    /// Creates a position before the first entry.
    pub fn zero() -> Self {
        Self { offset: 0 }
    }

    /// Returns the position after applying the entry at `offset`.
    pub fn at(offset: u64) -> Self {
        Self { offset }
    }

    /// Returns true if the entry at `offset` has not been applied yet.
    pub fn is_behind(&self, offset: u64) -> bool {
        self.offset < offset
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "offset({})", self.offset)
    }
}

/// A projection that folds stream entries into a read model.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Returns the name of this projection.
    fn name(&self) -> &'static str;

    /// Applies one entry and advances the position to its offset.
    async fn handle(&self, entry: &StreamEntry) -> Result<()>;

    /// Advances the position past an entry that could not be applied.
    async fn skip(&self, entry: &StreamEntry);

    /// Returns the current position of this projection.
    async fn position(&self) -> ProjectionPosition;

    /// Resets the projection to its initial state.
    async fn reset(&self) -> Result<()>;
}
