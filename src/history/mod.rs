//! Snapshot-based undo over the region store.

use thiserror::Error;

use crate::region::RegionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("nothing to undo")]
    NothingToUndo,
}

pub type HistoryResult<T> = std::result::Result<T, HistoryError>;

/// Stack of full store snapshots. Each entry is the state *before* one
/// committed mutation. There is no redo side.
#[derive(Debug, Clone, Default)]
pub struct HistoryStack {
    snapshots: Vec<RegionStore>,
    capacity: Option<usize>,
}

impl HistoryStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bounded stack drops its oldest snapshot once `capacity` is exceeded.
    pub fn with_capacity_limit(capacity: Option<usize>) -> Self {
        Self {
            snapshots: Vec::new(),
            capacity: capacity.filter(|limit| *limit > 0),
        }
    }

    pub fn push(&mut self, snapshot: RegionStore) {
        self.snapshots.push(snapshot);
        if let Some(limit) = self.capacity {
            if self.snapshots.len() > limit {
                let overflow = self.snapshots.len() - limit;
                self.snapshots.drain(..overflow);
                tracing::debug!(limit, "history capacity reached; dropped oldest snapshot");
            }
        }
    }

    pub fn undo(&mut self) -> HistoryResult<RegionStore> {
        self.snapshots.pop().ok_or(HistoryError::NothingToUndo)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        !self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}
