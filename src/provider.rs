//! The context provider: cached question answering over repository history.
//!
//! Front door of the crate. Owns the two-tier cache, the embedding
//! service, and a handle to the synthesis backend, and guarantees that
//! `query` always returns an answer object: cached when possible, freshly
//! synthesized on a miss, degraded (confidence 0.0, never cached) when the
//! backend times out or fails.
//!
//! # Initialization
//! Lazy tri-state: the first query drives `Uninitialized` through
//! `Initializing` to `Ready` or `Failed`. One async mutex makes
//! initialization single-flight; concurrent first-callers await the same
//! attempt. `Failed` is memoized and terminal until [`ContextProvider::reset`].

use crate::backend::SynthesisBackend;
use crate::cache::{
    CacheStats, CacheTier, ExactCache, SemanticCache, TwoTierCoordinator,
};
use crate::config::Settings;
use crate::embedding::EmbeddingService;
use crate::error::{IndexError, ProviderError, ProviderResult};
use crate::fingerprint::QueryFingerprint;
use crate::types::{CachedAnswer, Score};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Observable lifecycle state of the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    Uninitialized,
    Initializing,
    Ready,
    Failed(String),
}

/// Result of one `query` call. There is always an answer; `tier` and
/// `similarity` are present only for cache hits, and `degraded` marks
/// answers produced without backend or cache help.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub answer: CachedAnswer,
    pub tier: Option<CacheTier>,
    pub similarity: Option<Score>,
    pub degraded: bool,
}

impl QueryOutcome {
    fn hit(answer: CachedAnswer, tier: CacheTier, similarity: Score) -> Self {
        Self {
            answer,
            tier: Some(tier),
            similarity: Some(similarity),
            degraded: false,
        }
    }

    fn fresh(answer: CachedAnswer) -> Self {
        Self {
            answer,
            tier: None,
            similarity: None,
            degraded: false,
        }
    }

    fn degraded(answer: CachedAnswer) -> Self {
        Self {
            answer,
            tier: None,
            similarity: None,
            degraded: true,
        }
    }
}

/// Aggregated provider statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStats {
    pub state: ProviderState,
    pub cache: CacheStats,
    pub backend_calls: u64,
    pub degraded_queries: u64,
    pub embedding_cache_hits: u64,
    pub embedding_cache_misses: u64,
    pub embedding_failures: u64,
}

/// Cached question-answering provider over one repository.
pub struct ContextProvider {
    settings: Settings,
    backend: Arc<dyn SynthesisBackend>,
    coordinator: TwoTierCoordinator,
    embeddings: Arc<EmbeddingService>,
    init: tokio::sync::Mutex<ProviderState>,
    backend_calls: AtomicU64,
    degraded_queries: AtomicU64,
}

impl std::fmt::Debug for ContextProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextProvider")
            .field("repository_path", &self.settings.repository_path)
            .field("state", &self.state())
            .finish()
    }
}

impl ContextProvider {
    /// Build a provider from settings, constructing the embedding service
    /// and both cache tiers from configuration.
    #[must_use]
    pub fn new(settings: Settings, backend: Arc<dyn SynthesisBackend>) -> Self {
        let model_dir = settings.index_path.join("models");
        let embeddings = Arc::new(EmbeddingService::from_config(&settings.embedding, &model_dir));
        Self::with_parts(settings, backend, embeddings)
    }

    /// Build a provider with an explicit embedding service (tests inject a
    /// deterministic one here).
    #[must_use]
    pub fn with_parts(
        settings: Settings,
        backend: Arc<dyn SynthesisBackend>,
        embeddings: Arc<EmbeddingService>,
    ) -> Self {
        let coordinator = TwoTierCoordinator::new(
            ExactCache::new(settings.cache.l1_max_entries),
            SemanticCache::new(&settings.cache, &settings.index, embeddings.clone()),
            settings.cache.semantic_enabled,
        );
        Self {
            settings,
            backend,
            coordinator,
            embeddings,
            init: tokio::sync::Mutex::new(ProviderState::Uninitialized),
            backend_calls: AtomicU64::new(0),
            degraded_queries: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state. A held initialization lock reads as
    /// `Initializing`.
    #[must_use]
    pub fn state(&self) -> ProviderState {
        match self.init.try_lock() {
            Ok(guard) => guard.clone(),
            Err(_) => ProviderState::Initializing,
        }
    }

    /// Drop a memoized `Failed` (or `Ready`) state so the next query
    /// re-attempts initialization. Cached answers are kept.
    pub async fn reset(&self) {
        let mut state = self.init.lock().await;
        *state = ProviderState::Uninitialized;
        info!("provider state reset");
    }

    /// Drive initialization to `Ready` or a memoized `Failed`.
    ///
    /// Holding the async mutex for the whole attempt is what makes this
    /// single-flight: concurrent first-callers queue on the lock and then
    /// observe the memoized outcome.
    async fn ensure_ready(&self) -> ProviderResult<()> {
        let mut state = self.init.lock().await;
        match &*state {
            ProviderState::Ready => return Ok(()),
            ProviderState::Failed(reason) => {
                return Err(ProviderError::Configuration {
                    reason: reason.clone(),
                });
            }
            ProviderState::Uninitialized | ProviderState::Initializing => {}
        }
        *state = ProviderState::Initializing;

        if !self.settings.repository_path.exists() {
            let reason = format!(
                "repository path does not exist: {}",
                self.settings.repository_path.display()
            );
            *state = ProviderState::Failed(reason.clone());
            return Err(ProviderError::Configuration { reason });
        }

        let backend = self.backend.clone();
        let result = tokio::task::spawn_blocking(move || backend.initialize()).await;
        match result {
            Ok(Ok(())) => {
                *state = ProviderState::Ready;
                info!("provider initialized");
                if self.settings.cache.semantic_enabled && !self.embeddings.is_available() {
                    let e = ProviderError::EmbeddingUnavailable {
                        reason: "no embedding backend".to_string(),
                    };
                    warn!(status = e.status_code(), error = %e, "running with Tier 1 only");
                }
                Ok(())
            }
            Ok(Err(e)) => {
                let reason = e.to_string();
                warn!(error = %reason, "backend initialization failed");
                *state = ProviderState::Failed(reason.clone());
                Err(ProviderError::Configuration { reason })
            }
            Err(join_error) => {
                let reason = format!("initialization task failed: {join_error}");
                *state = ProviderState::Failed(reason.clone());
                Err(ProviderError::Configuration { reason })
            }
        }
    }

    /// Answer a question about a file, consulting the cache first.
    ///
    /// Never errors: expected degraded conditions (initialization failure,
    /// backend timeout, backend failure) produce a zero-confidence answer
    /// that is not cached.
    pub async fn query(&self, file_path: &str, question: &str) -> QueryOutcome {
        if let Err(e) = self.ensure_ready().await {
            warn!(status = e.status_code(), error = %e, "query degraded");
            self.degraded_queries.fetch_add(1, Ordering::Relaxed);
            return QueryOutcome::degraded(CachedAnswer::degraded(
                file_path,
                question,
                &e.to_string(),
            ));
        }

        let fingerprint = QueryFingerprint::new(file_path, question);
        if let Some((answer, tier, similarity)) =
            self.coordinator.get(file_path, question, &fingerprint)
        {
            debug!(%fingerprint, ?tier, "cache hit");
            return QueryOutcome::hit(answer, tier, similarity);
        }

        self.backend_calls.fetch_add(1, Ordering::Relaxed);
        let timeout = Duration::from_millis(self.settings.query.backend_timeout_ms);
        let backend = self.backend.clone();
        let path = file_path.to_string();
        let q = question.to_string();
        let result = tokio::time::timeout(
            timeout,
            tokio::task::spawn_blocking(move || backend.synthesize(&path, &q)),
        )
        .await;

        let error = match result {
            Ok(Ok(Ok(synthesis))) => {
                let answer = CachedAnswer::from_backend(
                    file_path,
                    question,
                    synthesis.answer,
                    synthesis.citations,
                    synthesis.confidence,
                );
                self.coordinator.put(fingerprint, answer.clone());
                return QueryOutcome::fresh(answer);
            }
            Ok(Ok(Err(backend_error))) => ProviderError::BackendFailure(backend_error),
            Ok(Err(join_error)) => ProviderError::BackendFailure(
                crate::backend::BackendError::Synthesis(format!("task failed: {join_error}")),
            ),
            Err(_elapsed) => ProviderError::BackendTimeout {
                timeout_ms: self.settings.query.backend_timeout_ms,
            },
        };

        warn!(status = error.status_code(), error = %error, "backend query degraded");
        self.degraded_queries.fetch_add(1, Ordering::Relaxed);
        QueryOutcome::degraded(CachedAnswer::degraded(file_path, question, &error.to_string()))
    }

    /// Synchronous wrapper for callers outside any async runtime.
    ///
    /// # Panics
    /// Panics if called from within a tokio runtime; use [`Self::query`]
    /// there instead.
    pub fn query_blocking(&self, file_path: &str, question: &str) -> QueryOutcome {
        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(self.query(file_path, question)),
            Err(e) => {
                self.degraded_queries.fetch_add(1, Ordering::Relaxed);
                QueryOutcome::degraded(CachedAnswer::degraded(
                    file_path,
                    question,
                    &format!("runtime unavailable: {e}"),
                ))
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> ProviderStats {
        ProviderStats {
            state: self.state(),
            cache: self.coordinator.stats(),
            backend_calls: self.backend_calls.load(Ordering::Relaxed),
            degraded_queries: self.degraded_queries.load(Ordering::Relaxed),
            embedding_cache_hits: self.embeddings.cache_hits(),
            embedding_cache_misses: self.embeddings.cache_misses(),
            embedding_failures: self.embeddings.failure_count(),
        }
    }

    /// Drop all cached answers from both tiers.
    pub fn clear_cache(&self) {
        self.coordinator.clear();
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn coordinator(&self) -> &TwoTierCoordinator {
        &self.coordinator
    }

    /// Best-effort persistence of the semantic tier and the embedding
    /// content cache under `index_path`.
    ///
    /// # Errors
    /// [`ProviderError::Persistence`] on I/O failure.
    pub fn save_state(&self) -> ProviderResult<()> {
        let dir = &self.settings.index_path;
        std::fs::create_dir_all(dir).map_err(|e| ProviderError::Persistence {
            path: dir.clone(),
            source: e,
        })?;

        self.coordinator.semantic().save(dir).map_err(|e| match e {
            IndexError::Snapshot(source) => ProviderError::Persistence {
                path: dir.clone(),
                source,
            },
            other => ProviderError::IndexCorrupted {
                reason: other.to_string(),
            },
        })?;

        let embedding_path = dir.join("embeddings.json");
        self.embeddings
            .save_cache(&embedding_path)
            .map_err(|e| ProviderError::Persistence {
                path: embedding_path,
                source: std::io::Error::other(e.to_string()),
            })?;
        info!(path = %dir.display(), "provider state saved");
        Ok(())
    }

    /// Restore previously saved state. A missing snapshot restores
    /// nothing; a corrupted one is discarded and the provider continues
    /// with empty caches, reporting the corruption.
    ///
    /// # Errors
    /// [`ProviderError::IndexCorrupted`] when artifacts were present but
    /// unusable.
    pub fn load_state(&self) -> ProviderResult<usize> {
        let dir = &self.settings.index_path;
        let embedding_path = dir.join("embeddings.json");
        if let Err(e) = self.embeddings.load_cache(&embedding_path) {
            warn!(error = %e, "embedding cache unreadable, starting empty");
        }

        match self.coordinator.semantic().load(dir) {
            Ok(restored) => {
                if restored > 0 {
                    info!(restored, "semantic cache restored from snapshot");
                }
                Ok(restored)
            }
            Err(e) => {
                warn!(error = %e, "snapshot unusable, starting with an empty index");
                Err(ProviderError::IndexCorrupted {
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, StaticBackend, Synthesis};
    use crate::embedding::HashEmbeddingGenerator;

    struct SlowBackend {
        delay: Duration,
    }

    impl SynthesisBackend for SlowBackend {
        fn initialize(&self) -> Result<(), BackendError> {
            Ok(())
        }

        fn synthesize(&self, _: &str, _: &str) -> Result<Synthesis, BackendError> {
            std::thread::sleep(self.delay);
            Ok(Synthesis {
                answer: "late".to_string(),
                citations: Vec::new(),
                confidence: 0.9,
            })
        }
    }

    struct FailingInit;

    impl SynthesisBackend for FailingInit {
        fn initialize(&self) -> Result<(), BackendError> {
            Err(BackendError::Unavailable {
                reason: "history scan crashed".to_string(),
            })
        }

        fn synthesize(&self, _: &str, _: &str) -> Result<Synthesis, BackendError> {
            unreachable!("initialize never succeeds")
        }
    }

    fn test_settings(timeout_ms: u64) -> Settings {
        let mut settings = Settings::default();
        settings.query.backend_timeout_ms = timeout_ms;
        settings.embedding.dimension = 128;
        settings
    }

    fn test_embeddings() -> Arc<EmbeddingService> {
        Arc::new(EmbeddingService::new(
            Arc::new(HashEmbeddingGenerator::new(128)),
            8,
        ))
    }

    fn provider_with(backend: Arc<dyn SynthesisBackend>, timeout_ms: u64) -> ContextProvider {
        ContextProvider::with_parts(test_settings(timeout_ms), backend, test_embeddings())
    }

    #[tokio::test]
    async fn test_miss_then_exact_hit() {
        let provider = provider_with(Arc::new(StaticBackend::new()), 2000);

        let first = provider.query("src/auth.py", "Why was JWT chosen?").await;
        assert!(first.tier.is_none());
        assert!(!first.degraded);

        let second = provider.query("src/auth.py", "Why was JWT chosen?").await;
        assert_eq!(second.tier, Some(CacheTier::L1));
        assert_eq!(second.similarity, Some(Score::one()));
        assert_eq!(provider.stats().backend_calls, 1);
    }

    #[tokio::test]
    async fn test_timeout_degrades_and_never_caches() {
        let provider = provider_with(
            Arc::new(SlowBackend {
                delay: Duration::from_millis(300),
            }),
            50,
        );

        let outcome = provider.query("src/auth.py", "Why was JWT chosen?").await;
        assert!(outcome.degraded);
        assert_eq!(outcome.answer.confidence, 0.0);
        assert!(outcome.answer.answer_text.contains("unavailable"));

        // Nothing cached: the retry goes to the backend again
        assert!(provider.coordinator().exact().is_empty());
        assert!(provider.coordinator().semantic().is_empty());
    }

    #[tokio::test]
    async fn test_failed_initialization_is_memoized_until_reset() {
        let provider = provider_with(Arc::new(FailingInit), 2000);

        let outcome = provider.query("src/auth.py", "why?").await;
        assert!(outcome.degraded);
        assert!(matches!(provider.state(), ProviderState::Failed(_)));

        // Memoized: the second query degrades without re-running init
        let outcome = provider.query("src/auth.py", "why?").await;
        assert!(outcome.degraded);

        provider.reset().await;
        assert_eq!(provider.state(), ProviderState::Uninitialized);
    }

    #[tokio::test]
    async fn test_missing_repository_path_fails_configuration() {
        let mut settings = test_settings(2000);
        settings.repository_path = "/definitely/not/a/repo".into();
        let provider = ContextProvider::with_parts(
            settings,
            Arc::new(StaticBackend::new()),
            test_embeddings(),
        );

        let outcome = provider.query("src/auth.py", "why?").await;
        assert!(outcome.degraded);
        assert!(matches!(provider.state(), ProviderState::Failed(_)));
    }

    #[tokio::test]
    async fn test_concurrent_first_queries_share_initialization() {
        let provider = Arc::new(provider_with(Arc::new(StaticBackend::new()), 2000));

        let mut handles = Vec::new();
        for i in 0..8 {
            let provider = provider.clone();
            handles.push(tokio::spawn(async move {
                provider
                    .query("src/auth.py", &format!("why question {i}?"))
                    .await
            }));
        }
        for handle in handles {
            let outcome = handle.await.unwrap();
            assert!(!outcome.degraded);
        }
        assert_eq!(provider.state(), ProviderState::Ready);
    }

    #[test]
    fn test_query_blocking_outside_runtime() {
        let provider = provider_with(Arc::new(StaticBackend::new()), 2000);
        let outcome = provider.query_blocking("src/auth.py", "Why was JWT chosen?");
        assert!(!outcome.degraded);
    }
}
