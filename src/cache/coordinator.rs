//! Two-tier coordination: exact lookup first, semantic fallback, promotion.

use crate::cache::exact::ExactCache;
use crate::cache::semantic::SemanticCache;
use crate::cache::stats::CacheStats;
use crate::fingerprint::QueryFingerprint;
use crate::types::{AnswerSource, CachedAnswer, Score};
use serde::Serialize;
use tracing::debug;

/// Which tier served a cached answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CacheTier {
    L1,
    L2,
}

/// Coordinates the exact (Tier 1) and semantic (Tier 2) caches.
///
/// Each tier keeps its own lock and the coordinator never holds both at
/// once. Two concurrent misses for the same query can therefore both reach
/// the backend; the benign race costs one redundant call and last write
/// wins on the subsequent puts.
#[derive(Debug)]
pub struct TwoTierCoordinator {
    exact: ExactCache,
    semantic: SemanticCache,
    semantic_enabled: bool,
}

impl TwoTierCoordinator {
    #[must_use]
    pub fn new(exact: ExactCache, semantic: SemanticCache, semantic_enabled: bool) -> Self {
        Self {
            exact,
            semantic,
            semantic_enabled,
        }
    }

    /// Look up a query: Tier 1 by fingerprint, then Tier 2 by similarity.
    ///
    /// A Tier 1 hit reports similarity 1.0. A Tier 2 hit is promoted into
    /// Tier 1 under the query's own fingerprint (last write wins) so the
    /// exact repeat becomes a Tier 1 hit.
    pub fn get(
        &self,
        file_path: &str,
        question: &str,
        fingerprint: &QueryFingerprint,
    ) -> Option<(CachedAnswer, CacheTier, Score)> {
        if let Some(answer) = self.exact.get(fingerprint) {
            debug!(%fingerprint, "exact cache hit");
            return Some((
                answer.with_source(AnswerSource::Exact),
                CacheTier::L1,
                Score::one(),
            ));
        }

        if !self.semantic_enabled {
            return None;
        }

        let (answer, similarity) = self.semantic.get(file_path, question)?;
        debug!(%fingerprint, similarity = similarity.get(), "semantic cache hit, promoting");
        self.exact.put(*fingerprint, answer.clone());
        Some((
            answer.with_source(AnswerSource::Semantic),
            CacheTier::L2,
            similarity,
        ))
    }

    /// Store a fresh answer in both tiers.
    pub fn put(&self, fingerprint: QueryFingerprint, answer: CachedAnswer) {
        self.exact.put(fingerprint, answer.clone());
        if self.semantic_enabled {
            self.semantic.put(answer);
        }
    }

    pub fn clear(&self) {
        self.exact.clear();
        self.semantic.clear();
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats::combine(
            self.exact.snapshot(),
            self.semantic.snapshot(),
            self.semantic_enabled,
        )
    }

    #[must_use]
    pub fn exact(&self) -> &ExactCache {
        &self.exact
    }

    #[must_use]
    pub fn semantic(&self) -> &SemanticCache {
        &self.semantic
    }
}
