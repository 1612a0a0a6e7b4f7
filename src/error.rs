//! Error types for the history-context caching system
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages. Failures in optional
//! subsystems (embeddings, vector index, persistence) degrade a feature;
//! failures in the mandatory path (fingerprints, Tier 1) are programming
//! errors and surface as such.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the context provider and its caches
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Fatal configuration problems, surfaced once at initialization
    #[error(
        "Invalid repository or configuration: {reason}\nSuggestion: Check that the path exists and points to a git repository"
    )]
    Configuration { reason: String },

    /// The backend exceeded the configured query timeout
    #[error("Backend query timed out after {timeout_ms}ms")]
    BackendTimeout { timeout_ms: u64 },

    /// The backend failed for this call; recoverable, never poisons the cache
    #[error("Backend synthesis failed: {0}")]
    BackendFailure(#[from] crate::backend::BackendError),

    /// Embeddings are unavailable; Tier 2 disables itself and the system
    /// continues in Tier-1-only mode
    #[error(
        "Embedding backend unavailable: {reason}\nSuggestion: Semantic cache is disabled; exact-match caching continues"
    )]
    EmbeddingUnavailable { reason: String },

    /// The vector index was found corrupted and has been reinitialized
    #[error("Vector index corrupted: {reason}. Reinitialized an empty index")]
    IndexCorrupted { reason: String },

    /// Snapshot persistence errors
    #[error("Failed to persist cache state to '{path}': {source}")]
    Persistence {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ProviderError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::BackendTimeout { .. } => "BACKEND_TIMEOUT",
            Self::BackendFailure(_) => "BACKEND_FAILURE",
            Self::EmbeddingUnavailable { .. } => "EMBEDDING_UNAVAILABLE",
            Self::IndexCorrupted { .. } => "INDEX_CORRUPTED",
            Self::Persistence { .. } => "PERSISTENCE_ERROR",
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Configuration { .. } => vec![
                "Verify the repository path in codewhy.toml or CODEWHY_* env vars",
                "Call reset() on the provider after fixing the configuration",
            ],
            Self::BackendTimeout { .. } => vec![
                "Increase query.backend_timeout_ms if the repository history is large",
                "The degraded answer is not cached; retrying may succeed",
            ],
            Self::BackendFailure(_) => vec![
                "The failure was not cached; retrying may succeed",
                "Check backend logs for the underlying cause",
            ],
            Self::EmbeddingUnavailable { .. } => vec![
                "Check that the embedding model is downloaded and readable",
                "Set embedding.provider = \"null\" to silence this warning",
            ],
            Self::IndexCorrupted { .. } => vec![
                "Delete the index snapshot files to force a clean rebuild",
                "Check for disk errors or filesystem corruption",
            ],
            Self::Persistence { .. } => vec![
                "Check disk space and permissions for the index directory",
                "The in-memory cache is unaffected; only the snapshot failed",
            ],
        }
    }
}

/// Errors specific to embedding generation
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error(
        "Failed to initialize embedding model: {0}\nSuggestion: Ensure you have internet connection for first-time model download"
    )]
    ModelInit(String),

    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),

    #[error(
        "Embedding dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Failed to persist embedding cache to '{path}': {source}")]
    CachePersistence {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(
        "Embedding cache file is corrupted: {0}\nSuggestion: Delete the cache file; it will be rebuilt"
    )]
    CacheCorrupted(String),
}

/// Errors specific to vector index operations
#[derive(Error, Debug)]
pub enum IndexError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "Index has not been trained\nSuggestion: Call train() with a representative sample before inserting vectors"
    )]
    NotTrained,

    #[error(
        "Clustering failed: {0}\nSuggestion: Ensure sufficient vectors are available for clustering (minimum: k clusters)"
    )]
    ClusteringFailed(String),

    #[error("Index snapshot error: {0}\nSuggestion: Check disk space and file permissions")]
    Snapshot(#[from] std::io::Error),

    #[error(
        "Index snapshot is corrupted: {0}\nSuggestion: Delete the snapshot files; the index will start empty"
    )]
    SnapshotCorrupted(String),
}

/// Result type alias for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Result type alias for embedding operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;
