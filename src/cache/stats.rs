//! Cache statistics: monotonic counters and serializable snapshots.
//!
//! Each tier owns one [`TierCounters`] and bumps it lock-free on the hot
//! path; lookup latency feeds a fixed-bucket histogram so snapshots can
//! report p95 alongside average and max. The coordinator assembles
//! per-tier snapshots plus derived combined rates into a [`CacheStats`]
//! that serializes straight to JSON for dashboards. Counters only reset on
//! an explicit `clear`.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Upper bounds (inclusive, in microseconds) of the latency histogram
/// buckets; lookups slower than the last bound land in an overflow bucket.
const LATENCY_BUCKETS_MICROS: [u64; 7] = [10, 50, 100, 500, 1_000, 5_000, 10_000];

/// Lock-free monotonic counters for one cache tier.
#[derive(Debug, Default)]
pub struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    lookup_micros: AtomicU64,
    lookups: AtomicU64,
    max_lookup_micros: AtomicU64,
    latency_buckets: [AtomicU64; LATENCY_BUCKETS_MICROS.len() + 1],
}

impl TierCounters {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_lookup(&self, elapsed: Duration) {
        let micros = elapsed.as_micros() as u64;
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.lookup_micros.fetch_add(micros, Ordering::Relaxed);
        self.max_lookup_micros.fetch_max(micros, Ordering::Relaxed);

        let bucket = LATENCY_BUCKETS_MICROS
            .iter()
            .position(|bound| micros <= *bound)
            .unwrap_or(LATENCY_BUCKETS_MICROS.len());
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
        self.lookup_micros.store(0, Ordering::Relaxed);
        self.lookups.store(0, Ordering::Relaxed);
        self.max_lookup_micros.store(0, Ordering::Relaxed);
        for bucket in &self.latency_buckets {
            bucket.store(0, Ordering::Relaxed);
        }
    }

    /// Upper bound of the histogram bucket holding the given quantile of
    /// lookups; the overflow bucket reports the observed maximum instead.
    fn latency_percentile(&self, lookups: u64, quantile: f64) -> u64 {
        if lookups == 0 {
            return 0;
        }
        let rank = ((lookups as f64 * quantile).ceil() as u64).max(1);
        let mut seen = 0;
        for (i, bucket) in self.latency_buckets.iter().enumerate() {
            seen += bucket.load(Ordering::Relaxed);
            if seen >= rank {
                if let Some(bound) = LATENCY_BUCKETS_MICROS.get(i) {
                    return *bound;
                }
                break;
            }
        }
        self.max_lookup_micros.load(Ordering::Relaxed)
    }

    /// Freeze the counters plus current-size figures into a snapshot.
    #[must_use]
    pub fn snapshot(&self, entries: usize, estimated_bytes: usize) -> TierSnapshot {
        let hits = self.hits();
        let misses = self.misses();
        let lookups = self.lookups.load(Ordering::Relaxed);
        let total = hits + misses;

        TierSnapshot {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            avg_lookup_micros: if lookups == 0 {
                0.0
            } else {
                self.lookup_micros.load(Ordering::Relaxed) as f64 / lookups as f64
            },
            p95_lookup_micros: self.latency_percentile(lookups, 0.95),
            max_lookup_micros: self.max_lookup_micros.load(Ordering::Relaxed),
            entries,
            estimated_memory_mb: estimated_bytes as f64 / (1024.0 * 1024.0),
        }
    }
}

/// Point-in-time view of one tier.
#[derive(Debug, Clone, Serialize)]
pub struct TierSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub hit_rate: f64,
    pub avg_lookup_micros: f64,
    pub p95_lookup_micros: u64,
    pub max_lookup_micros: u64,
    pub entries: usize,
    pub estimated_memory_mb: f64,
}

/// Combined view over both tiers.
///
/// `combined_hit_rate` counts a query as a hit when either tier served it,
/// over the total queries seen by Tier 1 (every lookup passes through
/// Tier 1 first), so it is never below `l1.hit_rate`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub l1: TierSnapshot,
    pub l2: TierSnapshot,
    pub semantic_enabled: bool,
    pub combined_hit_rate: f64,
}

impl CacheStats {
    #[must_use]
    pub fn combine(l1: TierSnapshot, l2: TierSnapshot, semantic_enabled: bool) -> Self {
        let total = l1.hits + l1.misses;
        let combined_hit_rate = if total == 0 {
            0.0
        } else {
            (l1.hits + l2.hits) as f64 / total as f64
        };
        Self {
            l1,
            l2,
            semantic_enabled,
            combined_hit_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_derivation() {
        let counters = TierCounters::default();
        counters.record_hit();
        counters.record_hit();
        counters.record_hit();
        counters.record_miss();

        let snapshot = counters.snapshot(3, 0);
        assert!((snapshot.hit_rate - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_empty_counters_report_zero_rates() {
        let snapshot = TierCounters::default().snapshot(0, 0);
        assert_eq!(snapshot.hit_rate, 0.0);
        assert_eq!(snapshot.avg_lookup_micros, 0.0);
        assert_eq!(snapshot.p95_lookup_micros, 0);
        assert_eq!(snapshot.max_lookup_micros, 0);
    }

    #[test]
    fn test_latency_p95_and_max() {
        let counters = TierCounters::default();
        for _ in 0..19 {
            counters.record_lookup(Duration::from_micros(5));
        }
        counters.record_lookup(Duration::from_micros(2_000));

        // The slow lookup is above the 95th percentile but sets the max
        let snapshot = counters.snapshot(0, 0);
        assert_eq!(snapshot.p95_lookup_micros, 10);
        assert_eq!(snapshot.max_lookup_micros, 2_000);
    }

    #[test]
    fn test_latency_overflow_bucket_reports_observed_max() {
        let counters = TierCounters::default();
        for _ in 0..20 {
            counters.record_lookup(Duration::from_micros(20_000));
        }
        let snapshot = counters.snapshot(0, 0);
        assert_eq!(snapshot.p95_lookup_micros, 20_000);
    }

    #[test]
    fn test_combined_rate_never_below_l1_rate() {
        let l1 = TierCounters::default();
        let l2 = TierCounters::default();
        // 1 L1 hit, 3 L1 misses; of those misses 2 hit L2
        l1.record_hit();
        for _ in 0..3 {
            l1.record_miss();
        }
        l2.record_hit();
        l2.record_hit();
        l2.record_miss();

        let stats = CacheStats::combine(l1.snapshot(1, 0), l2.snapshot(2, 0), true);
        assert!(stats.combined_hit_rate >= stats.l1.hit_rate);
        assert!((stats.combined_hit_rate - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_stats_serialize_to_json() {
        let stats = CacheStats::combine(
            TierCounters::default().snapshot(0, 0),
            TierCounters::default().snapshot(0, 0),
            true,
        );
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("combined_hit_rate"));
        assert!(json.contains("\"l1\""));
    }

    #[test]
    fn test_reset_clears_counters() {
        let counters = TierCounters::default();
        counters.record_hit();
        counters.record_evictions(4);
        counters.record_lookup(Duration::from_micros(500));
        counters.reset();
        let snapshot = counters.snapshot(0, 0);
        assert_eq!(snapshot.hits, 0);
        assert_eq!(snapshot.evictions, 0);
        assert_eq!(snapshot.max_lookup_micros, 0);
        assert_eq!(snapshot.p95_lookup_micros, 0);
    }
}
