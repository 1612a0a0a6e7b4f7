//! Shared fixtures for integration tests: deterministic embeddings, a
//! controllable clock, and instrumented backends.
#![allow(dead_code)]

use codewhy::backend::{BackendError, SynthesisBackend};
use codewhy::{EmbeddingService, HashEmbeddingGenerator, Settings, Synthesis};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

/// Clock that only moves when told to.
pub struct ManualClock {
    now: RwLock<SystemTime>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: RwLock::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write();
        *now += by;
    }
}

impl codewhy::Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.read()
    }
}

/// Word-hash embeddings: deterministic, fast, and similar texts land close.
pub fn test_embeddings() -> Arc<EmbeddingService> {
    Arc::new(EmbeddingService::new(
        Arc::new(HashEmbeddingGenerator::new(128)),
        8,
    ))
}

/// Default settings tuned for tests: small caches, permissive threshold
/// (the hash embedding is cruder than a real model), 128-d vectors.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.embedding.dimension = 128;
    settings.cache.similarity_threshold = 0.55;
    settings
}

/// Backend that counts synthesize calls and answers deterministically.
#[derive(Default)]
pub struct CountingBackend {
    calls: AtomicU64,
}

impl CountingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl SynthesisBackend for CountingBackend {
    fn initialize(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn synthesize(&self, file_path: &str, question: &str) -> Result<Synthesis, BackendError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(Synthesis {
            answer: format!("Synthesized answer about {file_path} for: {question}"),
            citations: Vec::new(),
            confidence: 0.9,
        })
    }
}

/// Backend that sleeps past any reasonable test timeout.
pub struct SlowBackend {
    pub delay: Duration,
}

impl SynthesisBackend for SlowBackend {
    fn initialize(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn synthesize(&self, _: &str, _: &str) -> Result<Synthesis, BackendError> {
        std::thread::sleep(self.delay);
        Ok(Synthesis {
            answer: "too late".to_string(),
            citations: Vec::new(),
            confidence: 0.9,
        })
    }
}
