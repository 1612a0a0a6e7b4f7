//! Contract for the answer-synthesis backend.
//!
//! The backend is the expensive collaborator this crate caches in front
//! of: it mines repository history (commits, pull requests, issues) and
//! synthesizes a cited answer for one `(file_path, question)` pair.
//! Implementations are blocking; the provider runs them on the blocking
//! thread pool under a timeout.

use crate::types::Citation;
use std::collections::HashMap;
use thiserror::Error;

/// One synthesized answer as produced by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub answer: String,
    pub citations: Vec<Citation>,
    /// Backend's self-reported certainty, in [0, 1]
    pub confidence: f64,
}

/// Errors a backend may report. All of them are recoverable from the
/// caller's perspective: a failed synthesis degrades the answer, never the
/// provider.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error(
        "Not a usable repository: {path}\nSuggestion: Point repository_path at a checkout with history"
    )]
    InvalidRepository { path: String },

    #[error("Backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Synthesis failed: {0}")]
    Synthesis(String),
}

/// A blocking history-mining and answer-synthesis backend.
pub trait SynthesisBackend: Send + Sync {
    /// One-time warm-up: scan history and build whatever indexes the
    /// backend needs. Called once before the first synthesis.
    fn initialize(&self) -> Result<(), BackendError>;

    /// Synthesize an answer for one question about one file.
    fn synthesize(&self, file_path: &str, question: &str) -> Result<Synthesis, BackendError>;
}

/// Canned-answer backend keyed by file path.
///
/// Serves the CLI smoke path and tests; paths without a canned answer get
/// a low-confidence placeholder rather than an error.
#[derive(Debug, Default)]
pub struct StaticBackend {
    answers: HashMap<String, Synthesis>,
}

impl StaticBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_answer(mut self, file_path: impl Into<String>, synthesis: Synthesis) -> Self {
        self.answers.insert(file_path.into(), synthesis);
        self
    }
}

impl SynthesisBackend for StaticBackend {
    fn initialize(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn synthesize(&self, file_path: &str, question: &str) -> Result<Synthesis, BackendError> {
        if let Some(synthesis) = self.answers.get(file_path) {
            return Ok(synthesis.clone());
        }
        Ok(Synthesis {
            answer: format!("No recorded history explains '{question}' for {file_path}."),
            citations: Vec::new(),
            confidence: 0.1,
        })
    }
}
