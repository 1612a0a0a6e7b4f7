//! Embedding generation for semantic cache lookups.
//!
//! This module provides the trait and implementations for turning query
//! text into fixed-dimension unit vectors. The real provider uses fastembed
//! with the AllMiniLML6V2 model; the null provider is the capability
//! fallback when no embedding backend is available, selected at
//! construction time via [`crate::config::EmbeddingProvider`].
//!
//! Failure policy: per-item embedding failures produce a zero sentinel
//! vector and a recorded failure, never an error. Callers treat a zero-norm
//! vector as "no embedding available" and miss gracefully.

mod cache;

pub use cache::{EmbeddingCache, content_hash};

use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::error::{EmbeddingError, EmbeddingResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Trait for generating embeddings from text.
///
/// Implementations must be thread-safe and capable of handling batch
/// processing efficiently.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for multiple texts, one vector per input.
    fn generate_embeddings(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Get the dimension of embeddings produced by this generator.
    #[must_use]
    fn dimension(&self) -> usize;
}

/// Check whether a vector is the zero sentinel (no embedding available).
#[must_use]
pub fn is_zero_norm(vector: &[f32]) -> bool {
    vector.iter().all(|v| v.abs() < f32::EPSILON)
}

/// Capability fallback: reports the configured dimension but produces only
/// zero sentinel vectors. Every lookup through it misses gracefully.
#[derive(Debug)]
pub struct NullEmbeddingGenerator {
    dimension: usize,
}

impl NullEmbeddingGenerator {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl EmbeddingGenerator for NullEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.0; self.dimension]).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// FastEmbed implementation using the configured model.
///
/// Produces 384-dimensional embeddings (AllMiniLML6V2) that fastembed
/// returns already L2-normalized, so inner product equals cosine
/// similarity.
#[cfg(feature = "fastembed")]
pub struct FastEmbedGenerator {
    model: parking_lot::Mutex<fastembed::TextEmbedding>,
    dimension: usize,
}

#[cfg(feature = "fastembed")]
impl FastEmbedGenerator {
    /// Create a new generator with the given model cache directory.
    ///
    /// # Errors
    /// Returns an error if the model fails to initialize or download.
    pub fn new(model_dir: &std::path::Path, dimension: usize) -> EmbeddingResult<Self> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                .with_cache_dir(model_dir.to_path_buf())
                .with_show_download_progress(false),
        )
        .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;

        Ok(Self {
            model: parking_lot::Mutex::new(model),
            dimension,
        })
    }
}

#[cfg(feature = "fastembed")]
impl EmbeddingGenerator for FastEmbedGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();
        let embeddings = self
            .model
            .lock()
            .embed(text_strings, None)
            .map_err(|e| EmbeddingError::GenerationFailed(e.to_string()))?;

        for embedding in &embeddings {
            if embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Batching embedding front-end with a content-addressed cache.
///
/// Texts already in the cache are never re-embedded; the remainder is
/// embedded in batches of the configured size. Per-item failures fall back
/// to the zero sentinel instead of propagating.
pub struct EmbeddingService {
    generator: Arc<dyn EmbeddingGenerator>,
    cache: EmbeddingCache,
    batch_size: usize,
    failures: AtomicU64,
    available: bool,
}

impl std::fmt::Debug for EmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingService")
            .field("dimension", &self.generator.dimension())
            .field("batch_size", &self.batch_size)
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl EmbeddingService {
    pub fn new(generator: Arc<dyn EmbeddingGenerator>, batch_size: usize) -> Self {
        Self {
            generator,
            cache: EmbeddingCache::new(),
            batch_size: batch_size.max(1),
            failures: AtomicU64::new(0),
            available: true,
        }
    }

    /// Construct the generator named by the config, falling back to the
    /// null provider when the real one cannot initialize.
    pub fn from_config(config: &EmbeddingConfig, model_dir: &std::path::Path) -> Self {
        let (generator, available): (Arc<dyn EmbeddingGenerator>, bool) = match config.provider {
            EmbeddingProvider::Null => {
                (Arc::new(NullEmbeddingGenerator::new(config.dimension)), false)
            }
            EmbeddingProvider::FastEmbed => {
                #[cfg(feature = "fastembed")]
                {
                    match FastEmbedGenerator::new(model_dir, config.dimension) {
                        Ok(generator) => (Arc::new(generator) as Arc<dyn EmbeddingGenerator>, true),
                        Err(e) => {
                            warn!(error = %e, "embedding model unavailable, using null provider");
                            (Arc::new(NullEmbeddingGenerator::new(config.dimension)), false)
                        }
                    }
                }
                #[cfg(not(feature = "fastembed"))]
                {
                    let _ = model_dir;
                    warn!("built without the fastembed feature, using null provider");
                    (Arc::new(NullEmbeddingGenerator::new(config.dimension)), false)
                }
            }
        };
        let mut service = Self::new(generator, config.batch_size);
        service.available = available;
        service
    }

    /// Whether a real embedding backend is behind this service. When false
    /// every embedding is a zero sentinel and the semantic tier operates as
    /// a permanent miss.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.generator.dimension()
    }

    /// Embed a batch of texts. Infallible by contract: failed items come
    /// back as zero sentinel vectors.
    pub fn embed(&self, texts: &[&str]) -> Vec<Vec<f32>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut pending: Vec<(usize, &str)> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let hash = content_hash(text);
            match self.cache.get(&hash) {
                Some(vector) => results[i] = Some(vector),
                None => pending.push((i, text)),
            }
        }

        for chunk in pending.chunks(self.batch_size) {
            let chunk_texts: Vec<&str> = chunk.iter().map(|(_, t)| *t).collect();
            match self.generator.generate_embeddings(&chunk_texts) {
                Ok(embeddings) if embeddings.len() == chunk.len() => {
                    for ((i, text), embedding) in chunk.iter().zip(embeddings) {
                        if !is_zero_norm(&embedding) {
                            self.cache.insert(content_hash(text), embedding.clone());
                        }
                        results[*i] = Some(embedding);
                    }
                }
                Ok(embeddings) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        expected = chunk.len(),
                        actual = embeddings.len(),
                        "embedding batch returned wrong count, using sentinel vectors"
                    );
                }
                Err(e) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "embedding batch failed, using sentinel vectors");
                }
            }
        }

        let dimension = self.generator.dimension();
        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| vec![0.0; dimension]))
            .collect()
    }

    /// Embed a single text.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        self.embed(&[text])
            .pop()
            .unwrap_or_else(|| vec![0.0; self.generator.dimension()])
    }

    #[must_use]
    pub fn cache_hits(&self) -> u64 {
        self.cache.hits()
    }

    #[must_use]
    pub fn cache_misses(&self) -> u64 {
        self.cache.misses()
    }

    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Estimated memory footprint of the content cache in bytes.
    #[must_use]
    pub fn estimated_bytes(&self) -> usize {
        self.cache.estimated_bytes()
    }

    /// Persist the content cache to disk.
    pub fn save_cache(&self, path: &std::path::Path) -> EmbeddingResult<()> {
        self.cache.save(path)
    }

    /// Load a previously saved content cache. Missing file starts empty.
    pub fn load_cache(&self, path: &std::path::Path) -> EmbeddingResult<()> {
        self.cache.load(path)
    }
}

/// Deterministic generator for tests: hashes each word into a bucket and
/// normalizes, so texts sharing vocabulary get similar vectors.
#[derive(Debug)]
pub struct HashEmbeddingGenerator {
    dimension: usize,
}

impl HashEmbeddingGenerator {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text.split_whitespace() {
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in word.bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0100_0000_01b3);
            }
            let bucket = (hash as usize) % self.dimension;
            vector[bucket] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl EmbeddingGenerator for HashEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
