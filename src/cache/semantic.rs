//! Tier 2: semantic-similarity cache over a pluggable vector index.
//!
//! Entries are keyed by an embedding of `"{file_path}: {normalized_query}"`
//! so that paraphrases of the same question about the same file land close
//! together. Lookups take the single nearest neighbor and hit only above
//! the similarity threshold and within TTL.
//!
//! # Eviction
//! Runs on `put` at capacity, in two phases. First a TTL sweep drops every
//! expired entry. If the cache is still full, a hybrid score
//! `0.6 * recency + 0.4 * frequency` ranks the survivors and only the top
//! 80% of capacity is kept. Both phases end in a full index rebuild, which
//! is also what physically reclaims tombstones; between evictions, expired
//! entries only stop matching (misses), they are not purged eagerly.
//!
//! # Corruption
//! An index result pointing at an unknown slot means the index and the
//! entry table disagree. The cache reinitializes both empty, logs, and
//! keeps serving; losing cached answers is recoverable, serving wrong ones
//! is not.

use crate::cache::stats::{TierCounters, TierSnapshot};
use crate::config::{CacheConfig, IndexConfig};
use crate::embedding::{EmbeddingService, is_zero_norm};
use crate::error::{IndexError, IndexResult};
use crate::index::{IndexSnapshot, SlotId, VectorIndex, create_index, normalize_in_place};
use crate::normalize::normalize;
use crate::types::{CachedAnswer, Score};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

/// Fraction of capacity kept after a hybrid-score sweep.
const KEEP_RATIO_PERCENT: usize = 80;

/// Time source, injectable so TTL behavior is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Wall-clock time.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SemanticEntry {
    answer: CachedAnswer,
    #[serde(skip)]
    vector: Vec<f32>,
    stored_at: SystemTime,
    last_accessed_at: SystemTime,
    access_count: u64,
}

struct SemanticInner {
    index: Box<dyn VectorIndex>,
    entries: HashMap<SlotId, SemanticEntry>,
    next_slot: SlotId,
}

/// Semantic similarity cache (Tier 2).
pub struct SemanticCache {
    max_entries: usize,
    threshold: f32,
    ttl: Duration,
    index_config: IndexConfig,
    embeddings: Arc<EmbeddingService>,
    clock: Arc<dyn Clock>,
    inner: Mutex<SemanticInner>,
    counters: TierCounters,
}

impl std::fmt::Debug for SemanticCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticCache")
            .field("max_entries", &self.max_entries)
            .field("threshold", &self.threshold)
            .field("ttl", &self.ttl)
            .field("entries", &self.len())
            .finish()
    }
}

impl SemanticCache {
    #[must_use]
    pub fn new(
        cache_config: &CacheConfig,
        index_config: &IndexConfig,
        embeddings: Arc<EmbeddingService>,
    ) -> Self {
        Self::with_clock(cache_config, index_config, embeddings, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(
        cache_config: &CacheConfig,
        index_config: &IndexConfig,
        embeddings: Arc<EmbeddingService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let dimension = embeddings.dimension();
        Self {
            max_entries: cache_config.l2_max_entries,
            threshold: cache_config.similarity_threshold,
            ttl: Duration::from_secs(cache_config.ttl_seconds),
            index_config: index_config.clone(),
            embeddings,
            clock,
            inner: Mutex::new(SemanticInner {
                index: create_index(index_config, dimension),
                entries: HashMap::new(),
                next_slot: 0,
            }),
            counters: TierCounters::default(),
        }
    }

    fn composite_text(file_path: &str, question: &str) -> String {
        format!("{file_path}: {}", normalize(question))
    }

    fn age(&self, since: SystemTime) -> Duration {
        self.clock
            .now()
            .duration_since(since)
            .unwrap_or(Duration::ZERO)
    }

    /// Nearest-neighbor lookup. Hits require similarity at or above the
    /// threshold and an unexpired entry; expired matches count as misses
    /// and expirations, with physical purging deferred to eviction.
    pub fn get(&self, file_path: &str, question: &str) -> Option<(CachedAnswer, Score)> {
        let started = Instant::now();
        let result = self.lookup(file_path, question);
        self.counters.record_lookup(started.elapsed());
        match &result {
            Some(_) => self.counters.record_hit(),
            None => self.counters.record_miss(),
        }
        result
    }

    fn lookup(&self, file_path: &str, question: &str) -> Option<(CachedAnswer, Score)> {
        let text = Self::composite_text(file_path, question);
        let mut vector = self.embeddings.embed_one(&text);
        if is_zero_norm(&vector) {
            return None;
        }
        normalize_in_place(&mut vector);

        let mut inner = self.inner.lock();
        let (slot, score) = inner.index.search(&vector, 1).into_iter().next()?;
        if score.get() < self.threshold {
            return None;
        }

        let now = self.clock.now();
        let ttl = self.ttl;
        let Some(entry) = inner.entries.get_mut(&slot) else {
            warn!(slot, "index result points at unknown entry, reinitializing");
            self.reinitialize(&mut inner);
            return None;
        };

        if now
            .duration_since(entry.stored_at)
            .unwrap_or(Duration::ZERO)
            > ttl
        {
            self.counters.record_expirations(1);
            return None;
        }

        entry.access_count += 1;
        entry.last_accessed_at = now;
        Some((entry.answer.clone(), score))
    }

    /// Insert an answer. A zero-norm embedding (no embedding available)
    /// drops the entry with a warning; this is not an error. Every stored
    /// vector is renormalized to unit length so a generator with skewed
    /// norms cannot inflate inner-product scores.
    pub fn put(&self, answer: CachedAnswer) {
        if self.max_entries == 0 {
            return;
        }

        let text = Self::composite_text(&answer.file_path, &answer.question);
        let mut vector = self.embeddings.embed_one(&text);
        if is_zero_norm(&vector) {
            warn!(
                file_path = %answer.file_path,
                "no embedding available, entry not stored in semantic cache"
            );
            return;
        }
        normalize_in_place(&mut vector);

        let mut inner = self.inner.lock();
        if inner.entries.len() >= self.max_entries {
            // Leave a free slot for the insert below
            self.evict(&mut inner, self.max_entries.saturating_sub(1));
        }

        let slot = inner.next_slot;
        inner.next_slot += 1;
        let now = self.clock.now();
        inner.entries.insert(
            slot,
            SemanticEntry {
                answer,
                vector: vector.clone(),
                stored_at: now,
                last_accessed_at: now,
                access_count: 0,
            },
        );

        match inner.index.add(&[(slot, vector)]) {
            Ok(()) => {}
            // IVF needs a training pass; a full rebuild provides one
            Err(IndexError::NotTrained) => self.rebuild_index(&mut inner),
            Err(e) => {
                warn!(error = %e, "index rejected entry, dropping it");
                inner.entries.remove(&slot);
            }
        }
    }

    /// Two-phase eviction: TTL sweep, then hybrid-score sweep if the cache
    /// still holds more than `max_keep` entries. The score sweep keeps the
    /// top 80% of capacity, capped at `max_keep`, so a caller about to
    /// insert can guarantee itself a free slot even at capacity 1. Each
    /// phase that removes anything ends in a full index rebuild so index
    /// and entry counts stay equal.
    fn evict(&self, inner: &mut SemanticInner, max_keep: usize) {
        let now = self.clock.now();
        let ttl = self.ttl;

        let expired: Vec<SlotId> = inner
            .entries
            .iter()
            .filter(|(_, e)| {
                now.duration_since(e.stored_at).unwrap_or(Duration::ZERO) > ttl
            })
            .map(|(slot, _)| *slot)
            .collect();
        if !expired.is_empty() {
            for slot in &expired {
                inner.entries.remove(slot);
            }
            self.counters.record_expirations(expired.len() as u64);
            self.rebuild_index(inner);
            debug!(expired = expired.len(), "ttl sweep removed expired entries");
        }

        if inner.entries.len() <= max_keep {
            return;
        }

        let keep = (self.max_entries * KEEP_RATIO_PERCENT / 100).min(max_keep);
        let max_access = inner
            .entries
            .values()
            .map(|e| e.access_count)
            .max()
            .unwrap_or(0)
            .max(1);

        let mut ranked: Vec<(SlotId, f64)> = inner
            .entries
            .iter()
            .map(|(slot, entry)| {
                let age_hours = self.age(entry.last_accessed_at).as_secs_f64() / 3600.0;
                let recency = 1.0 / (1.0 + age_hours);
                let frequency = entry.access_count as f64 / max_access as f64;
                (*slot, 0.6 * recency + 0.4 * frequency)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let victims: Vec<SlotId> = ranked.iter().skip(keep).map(|(slot, _)| *slot).collect();
        for slot in &victims {
            inner.entries.remove(slot);
        }
        self.counters.record_evictions(victims.len() as u64);
        self.rebuild_index(inner);
        debug!(
            evicted = victims.len(),
            kept = inner.entries.len(),
            "hybrid-score sweep evicted low-value entries"
        );
    }

    fn rebuild_index(&self, inner: &mut SemanticInner) {
        let entries: Vec<(SlotId, Vec<f32>)> = inner
            .entries
            .iter()
            .map(|(slot, entry)| (*slot, entry.vector.clone()))
            .collect();
        if let Err(e) = inner.index.rebuild(&entries) {
            warn!(error = %e, "index rebuild failed, reinitializing empty");
            self.reinitialize(inner);
        }
    }

    fn reinitialize(&self, inner: &mut SemanticInner) {
        inner.index = create_index(&self.index_config, self.embeddings.dimension());
        inner.entries.clear();
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        self.reinitialize(&mut inner);
        self.counters.reset();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn snapshot(&self) -> TierSnapshot {
        let inner = self.inner.lock();
        let dimension = self.embeddings.dimension();
        let bytes: usize = inner
            .entries
            .values()
            .map(|e| e.answer.estimated_bytes() + dimension * 4)
            .sum();
        self.counters.snapshot(inner.entries.len(), bytes)
    }

    /// Persist the cache as two artifacts in `dir`: a binary vector blob
    /// and a JSON entry table. They are loaded together or not at all.
    ///
    /// # Errors
    /// I/O failures writing either artifact.
    pub fn save(&self, dir: &Path) -> IndexResult<()> {
        let inner = self.inner.lock();

        let vectors: Vec<(SlotId, Vec<f32>)> = inner
            .entries
            .iter()
            .map(|(slot, entry)| (*slot, entry.vector.clone()))
            .collect();
        IndexSnapshot::new(dir.join("vectors.bin")).save(self.embeddings.dimension(), &vectors)?;

        let table: HashMap<SlotId, &SemanticEntry> =
            inner.entries.iter().map(|(slot, e)| (*slot, e)).collect();
        let json = serde_json::to_vec_pretty(&table)
            .map_err(|e| IndexError::SnapshotCorrupted(e.to_string()))?;
        std::fs::write(dir.join("entries.json"), json)?;
        Ok(())
    }

    /// Restore a previously saved cache. Returns the number of entries
    /// retained; a missing snapshot restores nothing. A snapshot written
    /// under a larger capacity is swept down immediately so the size bound
    /// holds from the moment `load` returns. Any mismatch between the two
    /// artifacts is corruption and the cache stays empty.
    ///
    /// # Errors
    /// [`IndexError::SnapshotCorrupted`] when the artifacts disagree or
    /// only one is present; I/O failures reading them.
    pub fn load(&self, dir: &Path) -> IndexResult<usize> {
        let blob = IndexSnapshot::new(dir.join("vectors.bin")).load()?;
        let table_path = dir.join("entries.json");
        let table_bytes = match std::fs::read(&table_path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(IndexError::Snapshot(e)),
        };

        let (blob, table_bytes) = match (blob, table_bytes) {
            (Some(b), Some(t)) => (b, t),
            (None, None) => return Ok(0),
            _ => {
                return Err(IndexError::SnapshotCorrupted(
                    "vector blob and entry table must be present together".to_string(),
                ));
            }
        };

        let (dimension, vectors) = blob;
        if dimension != self.embeddings.dimension() {
            return Err(IndexError::SnapshotCorrupted(format!(
                "snapshot dimension {dimension} does not match configured {}",
                self.embeddings.dimension()
            )));
        }

        let mut table: HashMap<SlotId, SemanticEntry> = serde_json::from_slice(&table_bytes)
            .map_err(|e| IndexError::SnapshotCorrupted(e.to_string()))?;
        if table.len() != vectors.len() {
            return Err(IndexError::SnapshotCorrupted(format!(
                "entry table has {} entries but vector blob has {}",
                table.len(),
                vectors.len()
            )));
        }

        let mut entries = HashMap::with_capacity(vectors.len());
        for (slot, vector) in &vectors {
            let Some(mut entry) = table.remove(slot) else {
                return Err(IndexError::SnapshotCorrupted(format!(
                    "vector blob slot {slot} missing from entry table"
                )));
            };
            entry.vector = vector.clone();
            entries.insert(*slot, entry);
        }

        let mut inner = self.inner.lock();
        inner.index.rebuild(&vectors)?;
        let next_slot = entries.keys().max().map_or(0, |max| max + 1);
        inner.entries = entries;
        inner.next_slot = next_slot;
        if inner.entries.len() > self.max_entries {
            self.evict(&mut inner, self.max_entries);
        }
        Ok(inner.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingGenerator;
    use parking_lot::RwLock;
    use tempfile::TempDir;

    /// Clock that only moves when told to.
    struct ManualClock {
        now: RwLock<SystemTime>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                now: RwLock::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)),
            }
        }

        fn advance(&self, by: Duration) {
            let mut now = self.now.write();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> SystemTime {
            *self.now.read()
        }
    }

    fn service(dimension: usize) -> Arc<EmbeddingService> {
        Arc::new(EmbeddingService::new(
            Arc::new(HashEmbeddingGenerator::new(dimension)),
            8,
        ))
    }

    fn cache_with(
        l2_max: usize,
        threshold: f32,
        clock: Arc<ManualClock>,
    ) -> SemanticCache {
        let cache_config = CacheConfig {
            l2_max_entries: l2_max,
            similarity_threshold: threshold,
            ..CacheConfig::default()
        };
        SemanticCache::with_clock(&cache_config, &IndexConfig::default(), service(128), clock)
    }

    fn answer(file_path: &str, question: &str) -> CachedAnswer {
        CachedAnswer::from_backend(file_path, question, "answer text", vec![], 0.9)
    }

    #[test]
    fn test_identical_query_hits() {
        let cache = cache_with(10, 0.85, Arc::new(ManualClock::new()));
        cache.put(answer("src/auth.py", "Why was JWT chosen?"));

        let (hit, score) = cache.get("src/auth.py", "Why was JWT chosen?").unwrap();
        assert_eq!(hit.answer_text, "answer text");
        assert!(score.get() > 0.99);
    }

    #[test]
    fn test_unrelated_query_misses() {
        let cache = cache_with(10, 0.85, Arc::new(ManualClock::new()));
        cache.put(answer("src/auth.py", "Why was JWT chosen?"));
        assert!(cache.get("src/db.py", "how is pagination implemented").is_none());
    }

    #[test]
    fn test_empty_cache_misses() {
        let cache = cache_with(10, 0.85, Arc::new(ManualClock::new()));
        assert!(cache.get("src/auth.py", "why?").is_none());
    }

    #[test]
    fn test_ttl_expiry_misses_without_purging() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache_with(10, 0.85, clock.clone());
        cache.put(answer("src/auth.py", "Why was JWT chosen?"));

        clock.advance(Duration::from_secs(3601));
        assert!(cache.get("src/auth.py", "Why was JWT chosen?").is_none());
        // Purge is deferred to eviction
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.snapshot().expirations, 1);
    }

    #[test]
    fn test_eviction_keeps_size_bounded() {
        let cache = cache_with(20, 0.85, Arc::new(ManualClock::new()));
        for i in 0..100 {
            cache.put(answer(&format!("src/file{i}.rs"), &format!("why question {i}?")));
        }
        assert!(cache.len() <= 20);
        assert!(cache.snapshot().evictions > 0);
    }

    #[test]
    fn test_capacity_one_cache_stays_bounded() {
        let cache = cache_with(1, 0.85, Arc::new(ManualClock::new()));
        cache.put(answer("src/a.rs", "why was this split out?"));
        cache.put(answer("src/b.rs", "why does the loop restart?"));

        assert_eq!(cache.len(), 1);
        assert!(cache.get("src/b.rs", "why does the loop restart?").is_some());
        assert!(cache.snapshot().evictions > 0);
    }

    #[test]
    fn test_size_stays_bounded_at_small_capacities() {
        for capacity in 1..=4 {
            let cache = cache_with(capacity, 0.85, Arc::new(ManualClock::new()));
            for i in 0..10 {
                cache.put(answer(&format!("src/f{i}.rs"), &format!("why item {i}?")));
                assert!(
                    cache.len() <= capacity,
                    "size {} exceeds capacity {capacity}",
                    cache.len()
                );
            }
        }
    }

    #[test]
    fn test_ttl_sweep_runs_before_score_sweep() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache_with(5, 0.85, clock.clone());
        for i in 0..5 {
            cache.put(answer(&format!("src/a{i}.rs"), &format!("why thing {i}?")));
        }

        // All five expire; the next put only needs the TTL sweep
        clock.advance(Duration::from_secs(3601));
        cache.put(answer("src/fresh.rs", "why was this added?"));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.snapshot().expirations, 5);
        assert_eq!(cache.snapshot().evictions, 0);
    }

    #[test]
    fn test_frequently_accessed_entries_survive_eviction() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache_with(10, 0.85, clock.clone());

        cache.put(answer("src/hot.rs", "why is the hot path special?"));
        for _ in 0..10 {
            assert!(cache.get("src/hot.rs", "why is the hot path special?").is_some());
        }

        for i in 0..9 {
            cache.put(answer(&format!("src/cold{i}.rs"), &format!("why cold thing {i}?")));
        }
        // Capacity reached; this put triggers the hybrid sweep
        cache.put(answer("src/last.rs", "why the last thing?"));

        assert!(
            cache.get("src/hot.rs", "why is the hot path special?").is_some(),
            "frequently accessed entry should survive"
        );
    }

    /// Generator whose vectors come back with norm 3 instead of 1.
    struct ScaledGenerator {
        inner: HashEmbeddingGenerator,
    }

    impl crate::embedding::EmbeddingGenerator for ScaledGenerator {
        fn generate_embeddings(
            &self,
            texts: &[&str],
        ) -> crate::error::EmbeddingResult<Vec<Vec<f32>>> {
            Ok(self
                .inner
                .generate_embeddings(texts)?
                .into_iter()
                .map(|v| v.into_iter().map(|x| x * 3.0).collect())
                .collect())
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
    }

    #[test]
    fn test_non_unit_vectors_are_renormalized_before_insert() {
        let embeddings = Arc::new(EmbeddingService::new(
            Arc::new(ScaledGenerator {
                inner: HashEmbeddingGenerator::new(128),
            }),
            8,
        ));
        let cache_config = CacheConfig {
            similarity_threshold: 0.85,
            ..CacheConfig::default()
        };
        let cache = SemanticCache::new(&cache_config, &IndexConfig::default(), embeddings);
        cache.put(answer("src/auth.py", "why was jwt chosen?"));

        // Without renormalization the raw inner product is scaled 9x, so a
        // merely related question clamps to 1.0 and clears the threshold
        assert!(cache.get("src/auth.py", "why was oauth rejected?").is_none());

        let (_, score) = cache.get("src/auth.py", "why was jwt chosen?").unwrap();
        assert!(score.get() > 0.99);
    }

    #[test]
    fn test_zero_norm_embedding_drops_entry() {
        let cache_config = CacheConfig::default();
        let embeddings = Arc::new(EmbeddingService::new(
            Arc::new(crate::embedding::NullEmbeddingGenerator::new(128)),
            8,
        ));
        let cache = SemanticCache::new(&cache_config, &IndexConfig::default(), embeddings);

        cache.put(answer("src/auth.py", "why?"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new());
        let cache = cache_with(10, 0.85, clock.clone());
        cache.put(answer("src/auth.py", "Why was JWT chosen?"));
        cache.put(answer("src/db.py", "why sqlite over postgres?"));
        cache.save(dir.path()).unwrap();

        let restored = cache_with(10, 0.85, clock);
        assert_eq!(restored.load(dir.path()).unwrap(), 2);
        assert!(restored.get("src/auth.py", "Why was JWT chosen?").is_some());
    }

    #[test]
    fn test_load_sweeps_down_to_current_capacity() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new());
        let big = cache_with(10, 0.85, clock.clone());
        for i in 0..6 {
            big.put(answer(&format!("src/f{i}.rs"), &format!("why item {i}?")));
        }
        big.save(dir.path()).unwrap();

        let small = cache_with(3, 0.85, clock);
        let retained = small.load(dir.path()).unwrap();
        assert!(retained <= 3);
        assert_eq!(small.len(), retained);
    }

    #[test]
    fn test_load_missing_snapshot_is_empty_not_error() {
        let dir = TempDir::new().unwrap();
        let cache = cache_with(10, 0.85, Arc::new(ManualClock::new()));
        assert_eq!(cache.load(dir.path()).unwrap(), 0);
    }

    #[test]
    fn test_load_with_one_artifact_missing_is_corruption() {
        let dir = TempDir::new().unwrap();
        let cache = cache_with(10, 0.85, Arc::new(ManualClock::new()));
        cache.put(answer("src/auth.py", "why?"));
        cache.save(dir.path()).unwrap();
        std::fs::remove_file(dir.path().join("entries.json")).unwrap();

        let err = cache.load(dir.path()).unwrap_err();
        assert!(matches!(err, IndexError::SnapshotCorrupted(_)));
    }

    #[test]
    fn test_ivf_strategy_trains_through_rebuild() {
        let cache_config = CacheConfig {
            l2_max_entries: 50,
            ..CacheConfig::default()
        };
        let index_config = IndexConfig {
            strategy: crate::config::IndexStrategy::Ivf,
            n_probe: 100,
            ..IndexConfig::default()
        };
        let cache = SemanticCache::new(&cache_config, &index_config, service(128));

        for i in 0..20 {
            cache.put(answer(&format!("src/f{i}.rs"), &format!("why feature {i}?")));
        }
        assert_eq!(cache.len(), 20);
        assert!(cache.get("src/f7.rs", "why feature 7?").is_some());
    }
}
