//! Configuration module for the history-context caching system.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CODEWHY_` and use double
//! underscores to separate nested levels:
//! - `CODEWHY_CACHE__L2_MAX_ENTRIES=500` sets `cache.l2_max_entries`
//! - `CODEWHY_INDEX__STRATEGY=graph` sets `index.strategy`
//! - `CODEWHY_QUERY__BACKEND_TIMEOUT_MS=5000` sets `query.backend_timeout_ms`
//!
//! Every field has a default; no external configuration is required.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Repository the backend mines for history
    #[serde(default = "default_repository_path")]
    pub repository_path: PathBuf,

    /// Directory for snapshot artifacts (index blob, id map, embedding cache)
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Cache tier configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Embedding generation configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Query path configuration
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    /// Maximum entries in the exact-match (Tier 1) cache
    #[serde(default = "default_l1_max_entries")]
    pub l1_max_entries: usize,

    /// Maximum entries in the semantic (Tier 2) cache
    #[serde(default = "default_l2_max_entries")]
    pub l2_max_entries: usize,

    /// Minimum similarity for a Tier 2 hit
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Tier 2 entry time-to-live in seconds
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Enable the semantic tier. When false the coordinator behaves as a
    /// pure Tier-1-only cache.
    #[serde(default = "default_true")]
    pub semantic_enabled: bool,
}

/// Which embedding provider to construct.
///
/// Optional-dependency fallback is a strategy value picked at construction
/// time, never conditional imports or runtime type inspection.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// fastembed with the configured model
    FastEmbed,
    /// Sentinel provider: zero vectors, zero capability, never errors
    Null,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProvider,

    /// Model to use for embeddings
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match the model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Texts per embedding batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Which nearest-neighbor structure backs the semantic cache.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexStrategy {
    /// Brute-force inner product; always correct, O(n·d) per search
    Flat,
    /// Navigable-small-world graph; approximate, good above ~10k entries
    Graph,
    /// Inverted-file with k-means training phase
    Ivf,
    /// Unavailable backend: zero capacity, empty searches
    Null,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_strategy")]
    pub strategy: IndexStrategy,

    /// Graph: neighbors kept per node
    #[serde(default = "default_max_neighbors")]
    pub max_neighbors: usize,

    /// Graph: candidate breadth during construction
    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,

    /// Graph: candidate breadth during search
    #[serde(default = "default_ef_search")]
    pub ef_search: usize,

    /// IVF: clusters probed per search
    #[serde(default = "default_n_probe")]
    pub n_probe: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QueryConfig {
    /// Backend synthesis timeout in milliseconds
    #[serde(default = "default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_repository_path() -> PathBuf {
    PathBuf::from(".")
}
fn default_index_path() -> PathBuf {
    PathBuf::from(".codewhy/index")
}
fn default_false() -> bool {
    false
}
fn default_true() -> bool {
    true
}
fn default_l1_max_entries() -> usize {
    100
}
fn default_l2_max_entries() -> usize {
    500
}
fn default_similarity_threshold() -> f32 {
    0.85
}
fn default_ttl_seconds() -> u64 {
    3600
}
fn default_embedding_provider() -> EmbeddingProvider {
    EmbeddingProvider::FastEmbed
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_embedding_dimension() -> usize {
    crate::types::VECTOR_DIMENSION_384
}
fn default_batch_size() -> usize {
    32
}
fn default_index_strategy() -> IndexStrategy {
    IndexStrategy::Flat
}
fn default_max_neighbors() -> usize {
    16
}
fn default_ef_construction() -> usize {
    64
}
fn default_ef_search() -> usize {
    32
}
fn default_n_probe() -> usize {
    4
}
fn default_backend_timeout_ms() -> u64 {
    2000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            repository_path: default_repository_path(),
            index_path: default_index_path(),
            debug: false,
            cache: CacheConfig::default(),
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            query: QueryConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_max_entries: default_l1_max_entries(),
            l2_max_entries: default_l2_max_entries(),
            similarity_threshold: default_similarity_threshold(),
            ttl_seconds: default_ttl_seconds(),
            semantic_enabled: true,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            strategy: default_index_strategy(),
            max_neighbors: default_max_neighbors(),
            ef_construction: default_ef_construction(),
            ef_search: default_ef_search(),
            n_probe: default_n_probe(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            backend_timeout_ms: default_backend_timeout_ms(),
        }
    }
}

impl Settings {
    /// Load settings: defaults, then `codewhy.toml` if present, then
    /// `CODEWHY_*` environment overrides.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(Path::new("codewhy.toml"))
    }

    /// Load settings with an explicit TOML path (primarily for tests).
    pub fn load_from(toml_path: &Path) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(toml_path))
            .merge(Env::prefixed("CODEWHY_").split("__"))
            .extract()
    }
}
