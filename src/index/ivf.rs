//! Inverted-file index: k-means partitioning with probed search.
//!
//! Vectors are bucketed under their nearest trained centroid; a search
//! scans only the `n_probe` closest buckets instead of the whole set.
//! Requires a training pass before inserts, so the owning cache always
//! drives it through `rebuild`, which trains on the entries it is given.

use crate::config::IndexStrategy;
use crate::error::{IndexError, IndexResult};
use crate::index::clustering::{inner_product, kmeans, nearest_centroid};
use crate::index::{SlotId, VectorIndex, validate_dimensions};
use crate::types::Score;
use std::collections::HashSet;
use tracing::debug;

/// Upper bound on cluster count; beyond this the probe phase dominates.
const MAX_CLUSTERS: usize = 100;

/// Inverted-file index over unit vectors.
#[derive(Debug)]
pub struct IvfIndex {
    dimension: usize,
    n_probe: usize,
    centroids: Vec<Vec<f32>>,
    buckets: Vec<Vec<(SlotId, Vec<f32>)>>,
    tombstones: HashSet<SlotId>,
}

impl IvfIndex {
    #[must_use]
    pub fn new(dimension: usize, n_probe: usize) -> Self {
        Self {
            dimension,
            n_probe: n_probe.max(1),
            centroids: Vec::new(),
            buckets: Vec::new(),
            tombstones: HashSet::new(),
        }
    }

    /// Whether a training pass has produced centroids.
    #[must_use]
    pub fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }

    /// Cluster count heuristic: sqrt of the corpus size, capped.
    fn cluster_count(n: usize) -> usize {
        ((n as f64).sqrt().round() as usize).clamp(1, MAX_CLUSTERS).min(n)
    }

    /// Run k-means over the given vectors and reset the bucket layout.
    ///
    /// # Errors
    /// Fails when clustering cannot produce centroids (empty input).
    pub fn train(&mut self, vectors: &[Vec<f32>]) -> IndexResult<()> {
        let k = Self::cluster_count(vectors.len());
        let result = kmeans(vectors, k)?;
        debug!(
            clusters = k,
            iterations = result.iterations,
            "trained inverted-file index"
        );
        self.centroids = result.centroids;
        self.buckets = vec![Vec::new(); self.centroids.len()];
        self.tombstones.clear();
        Ok(())
    }

    fn probed_buckets(&self, query: &[f32]) -> Vec<usize> {
        let mut ranked: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, inner_product(query, c)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
            .into_iter()
            .take(self.n_probe)
            .map(|(i, _)| i)
            .collect()
    }
}

impl VectorIndex for IvfIndex {
    fn strategy(&self) -> IndexStrategy {
        IndexStrategy::Ivf
    }

    fn add(&mut self, entries: &[(SlotId, Vec<f32>)]) -> IndexResult<()> {
        if !self.is_trained() {
            return Err(IndexError::NotTrained);
        }
        validate_dimensions(entries, self.dimension)?;
        for (id, vector) in entries {
            self.tombstones.remove(id);
            let bucket = nearest_centroid(vector, &self.centroids);
            self.buckets[bucket].push((*id, vector.clone()));
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(SlotId, Score)> {
        if query.len() != self.dimension || k == 0 || !self.is_trained() {
            return Vec::new();
        }

        let mut candidates: Vec<(SlotId, Score)> = self
            .probed_buckets(query)
            .into_iter()
            .flat_map(|bucket| self.buckets[bucket].iter())
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
        if entries.is_empty() {
            self.centroids.clear();
            self.buckets.clear();
            self.tombstones.clear();
            return Ok(());
        }

        let vectors: Vec<Vec<f32>> = entries.iter().map(|(_, v)| v.clone()).collect();
        self.train(&vectors)?;
        self.add(entries)
    }

    fn len(&self) -> usize {
        self.buckets
            .iter()
            .flatten()
            .filter(|(id, _)| !self.tombstones.contains(id))
            .count()
    }
}
