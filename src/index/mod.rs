//! Pluggable nearest-neighbor indexes for the semantic cache.
//!
//! Three real strategies behind one trait — exact flat scan, a
//! navigable-small-world graph, and an inverted-file structure with a
//! k-means training phase — plus a null strategy for when no vector
//! backend is available. Strategy selection happens once at construction
//! via [`crate::config::IndexStrategy`].
//!
//! # Similarity convention
//! Every implementation reports [`Score`] in [0, 1], higher is better.
//! Vectors are expected pre-normalized, so raw inner product is cosine
//! similarity; the conversion (clamping) happens here at the index
//! boundary, never at call sites.
//!
//! # Removal
//! The backing structures do not support efficient in-place deletion, so
//! `remove` only tombstones ids; callers batch removals (the semantic
//! cache does this during eviction) and then `rebuild` with the surviving
//! entries. Live entry count and the owning cache's entry count stay equal
//! because every eviction ends in a rebuild.

mod clustering;
mod flat;
mod graph;
mod ivf;
mod null;
mod snapshot;

pub use clustering::{KMeansResult, inner_product, kmeans, normalize_in_place, normalized_copy};
pub use flat::FlatIndex;
pub use graph::GraphIndex;
pub use ivf::IvfIndex;
pub use null::NullIndex;
pub use snapshot::IndexSnapshot;

use crate::config::{IndexConfig, IndexStrategy};
use crate::error::{IndexError, IndexResult};
use crate::types::Score;

/// Identifier of one slot in the index; the semantic cache maps slots to
/// its own entries.
pub type SlotId = u64;

/// Nearest-neighbor search over unit vectors.
pub trait VectorIndex: Send {
    /// The strategy this index was built with.
    fn strategy(&self) -> IndexStrategy;

    /// Insert a batch of `(slot, vector)` pairs.
    ///
    /// # Errors
    /// Dimension mismatches are errors; the IVF strategy also errors when
    /// untrained.
    fn add(&mut self, entries: &[(SlotId, Vec<f32>)]) -> IndexResult<()>;

    /// Top-k nearest slots by similarity, best first.
    ///
    /// Never errors: an empty or unavailable index and a malformed query
    /// both produce empty results.
    fn search(&self, query: &[f32], k: usize) -> Vec<(SlotId, Score)>;

    /// Tombstone ids; physical removal is deferred to the next `rebuild`.
    fn remove(&mut self, ids: &[SlotId]);

    /// Replace all contents with the given entries, dropping tombstones.
    fn rebuild(&mut self, entries: &[(SlotId, Vec<f32>)]) -> IndexResult<()>;

    /// Number of live (non-tombstoned) entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Construct the index named by the configuration.
#[must_use]
pub fn create_index(config: &IndexConfig, dimension: usize) -> Box<dyn VectorIndex> {
    match config.strategy {
        IndexStrategy::Flat => Box::new(FlatIndex::new(dimension)),
        IndexStrategy::Graph => Box::new(GraphIndex::new(
            dimension,
            config.max_neighbors,
            config.ef_construction,
            config.ef_search,
        )),
        IndexStrategy::Ivf => Box::new(IvfIndex::new(dimension, config.n_probe)),
        IndexStrategy::Null => Box::new(NullIndex::new()),
    }
}

/// Validate one entry batch against the index dimension.
pub(crate) fn validate_dimensions(
    entries: &[(SlotId, Vec<f32>)],
    dimension: usize,
) -> IndexResult<()> {
    for (_, vector) in entries {
        if vector.len() != dimension {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::SlotId;
    use super::clustering::normalized_copy;

    /// Evenly spread unit vectors on a 2-plane, distinct enough for
    /// strategy tests.
    pub fn ring_vectors(n: usize, dimension: usize) -> Vec<(SlotId, Vec<f32>)> {
        (0..n)
            .map(|i| {
                let angle = i as f32 * std::f32::consts::PI * 2.0 / n as f32;
                let mut vector = vec![0.0; dimension];
                vector[0] = angle.cos();
                vector[1] = angle.sin();
                for (j, v) in vector.iter_mut().enumerate().skip(2).take(8) {
                    *v = ((i * j) as f32 / (n * dimension) as f32).sin() * 0.1;
                }
                (i as SlotId, normalized_copy(&vector))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;

    #[test]
    fn test_factory_builds_each_strategy() {
        let mut config = IndexConfig::default();
        for strategy in [
            IndexStrategy::Flat,
            IndexStrategy::Graph,
            IndexStrategy::Ivf,
            IndexStrategy::Null,
        ] {
            config.strategy = strategy;
            let index = create_index(&config, 8);
            assert_eq!(index.strategy(), strategy);
            assert!(index.is_empty());
        }
    }

    #[test]
    fn test_validate_dimensions() {
        let good = vec![(1u64, vec![0.0; 4])];
        assert!(validate_dimensions(&good, 4).is_ok());

        let bad = vec![(1u64, vec![0.0; 3])];
        assert!(validate_dimensions(&bad, 4).is_err());
    }
}
