//! Core data model for cached history answers.
//!
//! This module provides the payload types that flow between the backend,
//! both cache tiers, and the caller, plus the `Score` newtype used by the
//! vector index layer. Payloads are immutable once stored; tiers clone them
//! rather than sharing mutable state.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use thiserror::Error;

/// Standard vector dimension for the default embedding model (all-MiniLM-L6-v2).
pub const VECTOR_DIMENSION_384: usize = 384;

/// Which historical artifact a citation points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Commit,
    PullRequest,
    Issue,
}

/// A reference to a historical artifact supporting a synthesized answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Commit SHA, PR number, or issue number
    pub source_id: String,
    /// Short excerpt from the artifact (commit message, PR body, ...)
    pub excerpt: String,
    pub author: String,
    /// Unix timestamp of the artifact
    pub timestamp: i64,
    pub source_kind: SourceKind,
    /// How relevant the miner judged this artifact, in [0, 1]
    pub relevance_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Where a returned answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    /// Tier 1 exact fingerprint match
    Exact,
    /// Tier 2 semantic similarity match
    Semantic,
    /// Fresh backend synthesis
    Backend,
}

/// The cached result payload: a synthesized answer with its citations.
///
/// Immutable once stored. When an answer is promoted from Tier 2 into
/// Tier 1 it is cloned, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAnswer {
    pub file_path: String,
    /// The original (un-normalized) question text
    pub question: String,
    pub answer_text: String,
    pub citations: Vec<Citation>,
    /// Backend's self-reported certainty, in [0, 1]
    pub confidence: f64,
    pub produced_at: SystemTime,
    pub source: AnswerSource,
}

impl CachedAnswer {
    /// Build a payload from a fresh backend synthesis.
    pub fn from_backend(
        file_path: impl Into<String>,
        question: impl Into<String>,
        answer_text: impl Into<String>,
        citations: Vec<Citation>,
        confidence: f64,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            question: question.into(),
            answer_text: answer_text.into(),
            citations,
            confidence: confidence.clamp(0.0, 1.0),
            produced_at: SystemTime::now(),
            source: AnswerSource::Backend,
        }
    }

    /// Build the degraded answer returned when the backend times out or
    /// fails. Zero confidence, explanatory text, never cached.
    pub fn degraded(
        file_path: impl Into<String>,
        question: impl Into<String>,
        reason: &str,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            question: question.into(),
            answer_text: format!("History context is currently unavailable: {reason}"),
            citations: Vec::new(),
            confidence: 0.0,
            produced_at: SystemTime::now(),
            source: AnswerSource::Backend,
        }
    }

    /// Return a copy of this answer re-tagged with a cache source.
    pub fn with_source(&self, source: AnswerSource) -> Self {
        let mut answer = self.clone();
        answer.source = source;
        answer
    }

    /// Derived credibility score factoring in citation count and relevance.
    ///
    /// Confidence is what the backend claims; credibility also rewards
    /// answers grounded in more, and more relevant, historical artifacts.
    /// Saturates at five citations.
    pub fn credibility(&self) -> f64 {
        if self.citations.is_empty() {
            return self.confidence * 0.5;
        }
        let avg_relevance: f64 = self
            .citations
            .iter()
            .map(|c| f64::from(c.relevance_score))
            .sum::<f64>()
            / self.citations.len() as f64;
        let citation_factor = (self.citations.len() as f64 / 5.0).min(1.0);
        (self.confidence * 0.6 + avg_relevance * 0.25 + citation_factor * 0.15).clamp(0.0, 1.0)
    }

    /// Rough heap footprint of this payload in bytes, for memory reporting.
    pub fn estimated_bytes(&self) -> usize {
        self.file_path.len()
            + self.question.len()
            + self.answer_text.len()
            + self
                .citations
                .iter()
                .map(|c| {
                    c.source_id.len()
                        + c.excerpt.len()
                        + c.author.len()
                        + c.url.as_ref().map_or(0, String::len)
                        + 32
                })
                .sum::<usize>()
            + std::mem::size_of::<Self>()
    }
}

/// Type-safe wrapper for similarity scores.
///
/// Scores are normalized to the range [0.0, 1.0] where 1.0 indicates
/// perfect similarity and 0.0 indicates no similarity. This is the single
/// score convention for every index implementation; raw inner products are
/// converted at the index boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score(f32);

/// Errors from constructing score values.
#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("Invalid score value: {value}\nReason: {reason}")]
    Invalid { value: f32, reason: &'static str },
}

impl Score {
    /// Creates a new `Score` with validation.
    ///
    /// Returns an error if the score is not in the range [0.0, 1.0] or is NaN.
    pub fn new(value: f32) -> Result<Self, ScoreError> {
        if value.is_nan() {
            return Err(ScoreError::Invalid {
                value,
                reason: "Score cannot be NaN",
            });
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(ScoreError::Invalid {
                value,
                reason: "Score must be in range [0.0, 1.0]",
            });
        }
        Ok(Self(value))
    }

    /// Converts a raw inner product over unit vectors into a score.
    ///
    /// Negative cosine values clamp to zero: anything pointing away from
    /// the query is "no similarity" for cache purposes.
    #[must_use]
    pub fn from_inner_product(value: f32) -> Self {
        if value.is_nan() {
            return Self(0.0);
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// Creates a score of 0.0 (no similarity).
    #[must_use]
    pub const fn zero() -> Self {
        Self(0.0)
    }

    /// Creates a score of 1.0 (perfect similarity).
    #[must_use]
    pub const fn one() -> Self {
        Self(1.0)
    }

    /// Returns the underlying f32 value.
    #[must_use]
    pub fn get(&self) -> f32 {
        self.0
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .partial_cmp(&other.0)
            .expect("Score values should never be NaN")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn citation(relevance: f32) -> Citation {
        Citation {
            source_id: "abc123".to_string(),
            excerpt: "Switched to JWT for stateless auth".to_string(),
            author: "dev".to_string(),
            timestamp: 1_700_000_000,
            source_kind: SourceKind::Commit,
            relevance_score: relevance,
            url: None,
        }
    }

    #[test]
    fn test_score_validation() {
        assert_eq!(Score::new(0.5).unwrap().get(), 0.5);
        assert_eq!(Score::zero().get(), 0.0);
        assert_eq!(Score::one().get(), 1.0);

        assert!(Score::new(-0.1).is_err());
        assert!(Score::new(1.1).is_err());
        assert!(Score::new(f32::NAN).is_err());
    }

    #[test]
    fn test_score_from_inner_product_clamps() {
        assert_eq!(Score::from_inner_product(-0.4).get(), 0.0);
        assert_eq!(Score::from_inner_product(1.2).get(), 1.0);
        assert_eq!(Score::from_inner_product(f32::NAN).get(), 0.0);
        assert!((Score::from_inner_product(0.85).get() - 0.85).abs() < f32::EPSILON);
    }

    #[test]
    fn test_degraded_answer_has_zero_confidence() {
        let answer = CachedAnswer::degraded("auth.py", "Why JWT?", "backend timed out");
        assert_eq!(answer.confidence, 0.0);
        assert!(answer.citations.is_empty());
        assert!(answer.answer_text.contains("unavailable"));
    }

    #[test]
    fn test_credibility_rewards_citations() {
        let bare = CachedAnswer::from_backend("a.rs", "why?", "because", vec![], 0.8);
        let cited = CachedAnswer::from_backend(
            "a.rs",
            "why?",
            "because",
            vec![citation(0.9), citation(0.8), citation(0.7)],
            0.8,
        );
        assert!(cited.credibility() > bare.credibility());
        assert!(cited.credibility() <= 1.0);
    }

    #[test]
    fn test_with_source_does_not_mutate_original() {
        let answer = CachedAnswer::from_backend("a.rs", "why?", "because", vec![], 0.9);
        let promoted = answer.with_source(AnswerSource::Semantic);
        assert_eq!(answer.source, AnswerSource::Backend);
        assert_eq!(promoted.source, AnswerSource::Semantic);
    }
}
