//! Two-tier caching layer for repository-history question answering.
//!
//! Answers to "why does this code look like this?" are expensive to
//! synthesize, so this crate fronts the synthesis backend with an
//! exact-match LRU tier and a semantic-similarity tier over vector
//! embeddings, coordinated by a lazily initialized provider that degrades
//! gracefully when any optional subsystem is unavailable.

pub mod backend;
pub mod cache;
pub mod config;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod normalize;
pub mod provider;
pub mod types;

// Explicit exports for better API clarity
pub use backend::{BackendError, StaticBackend, Synthesis, SynthesisBackend};
pub use cache::{
    CacheStats, CacheTier, Clock, ExactCache, SemanticCache, SystemClock, TierSnapshot,
    TwoTierCoordinator,
};
pub use config::{IndexStrategy, Settings};
pub use embedding::{EmbeddingGenerator, EmbeddingService, HashEmbeddingGenerator};
pub use error::{
    EmbeddingError, EmbeddingResult, IndexError, IndexResult, ProviderError, ProviderResult,
};
pub use fingerprint::QueryFingerprint;
pub use index::{SlotId, VectorIndex, create_index};
pub use normalize::normalize;
pub use provider::{ContextProvider, ProviderState, ProviderStats, QueryOutcome};
pub use types::{AnswerSource, CachedAnswer, Citation, Score, SourceKind};
