//! Exact brute-force index: O(n·d) scan per search, always correct.

use crate::config::IndexStrategy;
use crate::error::IndexResult;
use crate::index::{SlotId, VectorIndex, inner_product, validate_dimensions};
use crate::types::Score;
use std::collections::HashSet;

/// Flat exact-scan index.
///
/// The baseline strategy and the default: correct at any size, fast enough
/// for the few hundred entries a bounded semantic cache holds.
#[derive(Debug)]
pub struct FlatIndex {
    dimension: usize,
    entries: Vec<(SlotId, Vec<f32>)>,
    tombstones: HashSet<SlotId>,
}

impl FlatIndex {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
            tombstones: HashSet::new(),
        }
    }
}

impl VectorIndex for FlatIndex {
    fn strategy(&self) -> IndexStrategy {
        IndexStrategy::Flat
    }

    fn add(&mut self, entries: &[(SlotId, Vec<f32>)]) -> IndexResult<()> {
        validate_dimensions(entries, self.dimension)?;
        for (id, vector) in entries {
            self.tombstones.remove(id);
            self.entries.push((*id, vector.clone()));
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(SlotId, Score)> {
        if query.len() != self.dimension || k == 0 {
            return Vec::new();
        }

        let mut candidates: Vec<(SlotId, Score)> = self
            .entries
            .iter()
            .filter(|(id, _)| !self.tombstones.contains(id))
            .map(|(id, vector)| (*id, Score::from_inner_product(inner_product(query, vector))))
            .collect();

        candidates.sort_by(|a, b| b.1.cmp(&a.1));
        candidates.truncate(k);
        candidates
    }

    fn remove(&mut self, ids: &[SlotId]) {
        self.tombstones.extend(ids.iter().copied());
    }

    fn rebuild(&mut self, entries: &[(SlotId, Vec<f32>)]) -> IndexResult<()> {
        validate_dimensions(entries, self.dimension)?;
        self.entries = entries.to_vec();
        self.tombstones.clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|(id, _)| !self.tombstones.contains(id))
            .count()
    }
}
