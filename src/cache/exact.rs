//! Tier 1: bounded exact-match LRU cache keyed by query fingerprint.

use crate::cache::stats::{TierCounters, TierSnapshot};
use crate::fingerprint::QueryFingerprint;
use crate::types::CachedAnswer;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;
use tracing::debug;

/// Exact-match LRU cache.
///
/// Map plus a recency deque with lazy deletion: every `get` hit and `put`
/// appends a (key, sequence) record and bumps the key's live sequence
/// number, leaving the old record behind as stale. Stale records are
/// skipped during eviction and compacted away once they outnumber live
/// keys, so each operation is O(1) amortized. No TTL applies at this tier.
#[derive(Debug)]
pub struct ExactCache {
    max_entries: usize,
    inner: Mutex<ExactInner>,
    counters: TierCounters,
}

#[derive(Debug)]
struct Slot {
    answer: CachedAnswer,
    seq: u64,
}

#[derive(Debug, Default)]
struct ExactInner {
    map: HashMap<QueryFingerprint, Slot>,
    recency: VecDeque<(QueryFingerprint, u64)>,
    next_seq: u64,
}

impl ExactInner {
    /// Mark a key most recently used. A deque record is stale once its
    /// sequence number no longer matches the one in the map.
    fn touch(&mut self, fingerprint: QueryFingerprint) {
        self.next_seq += 1;
        let seq = self.next_seq;
        if let Some(slot) = self.map.get_mut(&fingerprint) {
            slot.seq = seq;
        }
        self.recency.push_back((fingerprint, seq));

        // Each touch leaves at most one stale record, so compacting when
        // stale records outnumber live keys keeps the deque linear in map
        // size at amortized constant cost per operation.
        if self.recency.len() > self.map.len().saturating_mul(2).max(8) {
            let map = &self.map;
            self.recency
                .retain(|(fp, seq)| map.get(fp).is_some_and(|slot| slot.seq == *seq));
        }
    }

    /// Remove and return the least recently used live key, dropping any
    /// stale records found at the front.
    fn pop_lru(&mut self) -> Option<QueryFingerprint> {
        while let Some((fingerprint, seq)) = self.recency.pop_front() {
            if self
                .map
                .get(&fingerprint)
                .is_some_and(|slot| slot.seq == seq)
            {
                self.map.remove(&fingerprint);
                return Some(fingerprint);
            }
        }
        None
    }
}

impl ExactCache {
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            inner: Mutex::new(ExactInner::default()),
            counters: TierCounters::default(),
        }
    }

    /// Look up by fingerprint, refreshing recency on a hit.
    pub fn get(&self, fingerprint: &QueryFingerprint) -> Option<CachedAnswer> {
        let started = Instant::now();
        let mut inner = self.inner.lock();

        let result = if let Some(answer) = inner.map.get(fingerprint).map(|slot| slot.answer.clone())
        {
            inner.touch(*fingerprint);
            self.counters.record_hit();
            Some(answer)
        } else {
            self.counters.record_miss();
            None
        };

        self.counters.record_lookup(started.elapsed());
        result
    }

    /// Insert, evicting the least recently used entry at capacity.
    /// Re-inserting an existing fingerprint replaces its payload (last
    /// write wins) and refreshes recency.
    pub fn put(&self, fingerprint: QueryFingerprint, answer: CachedAnswer) {
        if self.max_entries == 0 {
            return;
        }
        let mut inner = self.inner.lock();

        if !inner.map.contains_key(&fingerprint) && inner.map.len() >= self.max_entries {
            if let Some(evicted) = inner.pop_lru() {
                self.counters.record_evictions(1);
                debug!(fingerprint = %evicted, "evicted least recently used exact entry");
            }
        }

        inner.map.insert(fingerprint, Slot { answer, seq: 0 });
        inner.touch(fingerprint);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.recency.clear();
        inner.next_seq = 0;
        self.counters.reset();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn snapshot(&self) -> TierSnapshot {
        let inner = self.inner.lock();
        let bytes: usize = inner
            .map
            .values()
            .map(|slot| slot.answer.estimated_bytes())
            .sum();
        self.counters.snapshot(inner.map.len(), bytes)
    }
}
