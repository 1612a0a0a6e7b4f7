//! No-op index used when embeddings are unavailable.

use crate::config::IndexStrategy;
use crate::error::IndexResult;
use crate::index::{SlotId, VectorIndex};
use crate::types::Score;

/// Index that stores nothing and matches nothing.
///
/// Standing in for a real index keeps the semantic-cache code path free of
/// "is the index present" branches: every search simply misses.
#[derive(Debug, Default)]
pub struct NullIndex;

impl NullIndex {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl VectorIndex for NullIndex {
    fn strategy(&self) -> IndexStrategy {
        IndexStrategy::Null
    }

    fn add(&mut self, _entries: &[(SlotId, Vec<f32>)]) -> IndexResult<()> {
        Ok(())
    }

    fn search(&self, _query: &[f32], _k: usize) -> Vec<(SlotId, Score)> {
        Vec::new()
    }

    fn remove(&mut self, _ids: &[SlotId]) {}

    fn rebuild(&mut self, _entries: &[(SlotId, Vec<f32>)]) -> IndexResult<()> {
        Ok(())
    }

    fn len(&self) -> usize {
        0
    }
}
