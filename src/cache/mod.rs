//! Two-tier answer cache.
//!
//! Tier 1 ([`exact`]) is a bounded exact-match LRU keyed by query
//! fingerprint; Tier 2 ([`semantic`]) matches paraphrases by embedding
//! similarity over a pluggable vector index. The [`coordinator`] checks
//! Tier 1 first, falls back to Tier 2, and promotes semantic hits so exact
//! repeats get the cheap path next time.

pub mod coordinator;
pub mod exact;
pub mod semantic;
pub mod stats;

pub use coordinator::{CacheTier, TwoTierCoordinator};
pub use exact::ExactCache;
pub use semantic::{Clock, SemanticCache, SystemClock};
pub use stats::{CacheStats, TierCounters, TierSnapshot};
