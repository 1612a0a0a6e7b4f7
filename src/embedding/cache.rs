//! Content-addressed embedding cache.
//!
//! Maps SHA-256 content hashes of input text to previously computed
//! vectors so identical text is never embedded twice. Unbounded in memory
//! but persisted to disk on demand via explicit `save`/`load`; eviction is
//! the semantic cache's concern, not this cache's. Locked independently
//! from the vector index (DashMap shards).

use crate::error::{EmbeddingError, EmbeddingResult};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hash text content for cache addressing.
#[must_use]
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Content-hash → vector cache with hit/miss counters.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: DashMap<String, Vec<f32>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a vector by content hash, counting the hit or miss.
    pub fn get(&self, hash: &str) -> Option<Vec<f32>> {
        match self.entries.get(hash) {
            Some(vector) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(vector.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, hash: String, vector: Vec<f32>) {
        self.entries.insert(hash, vector);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Estimated memory footprint in bytes (vectors + hash keys).
    #[must_use]
    pub fn estimated_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| entry.key().len() + entry.value().len() * std::mem::size_of::<f32>())
            .sum()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Persist the cache contents as a JSON artifact.
    pub fn save(&self, path: &Path) -> EmbeddingResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| {
                EmbeddingError::CachePersistence {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        }
        let snapshot: HashMap<String, Vec<f32>> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let json = serde_json::to_string(&snapshot)
            .map_err(|e| EmbeddingError::CacheCorrupted(e.to_string()))?;
        std::fs::write(path, json).map_err(|source| EmbeddingError::CachePersistence {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load cache contents from disk, replacing the current entries.
    ///
    /// A missing file is not an error; the cache simply starts empty.
    pub fn load(&self, path: &Path) -> EmbeddingResult<()> {
        if !path.exists() {
            return Ok(());
        }
        let json =
            std::fs::read_to_string(path).map_err(|source| EmbeddingError::CachePersistence {
                path: path.to_path_buf(),
                source,
            })?;
        let snapshot: HashMap<String, Vec<f32>> = serde_json::from_str(&json)
            .map_err(|e| EmbeddingError::CacheCorrupted(e.to_string()))?;
        self.entries.clear();
        for (hash, vector) in snapshot {
            self.entries.insert(hash, vector);
        }
        Ok(())
    }
}
