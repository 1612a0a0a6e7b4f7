//! Deterministic query fingerprints for exact-match (Tier 1) lookup.

use crate::normalize::normalize;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// A deterministic hash of `(resolved_file_path, normalized_question)`.
///
/// Unique per semantic query; used only by the exact-match cache. The
/// question is normalized before hashing so that trivially different
/// spellings of the same query share a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryFingerprint([u8; 32]);

impl QueryFingerprint {
    /// Build a fingerprint from a file path and a free-text question.
    ///
    /// The path is lexically resolved (no filesystem access) so that
    /// `./src/auth.py` and `src/auth.py` fingerprint identically.
    #[must_use]
    pub fn new(file_path: &str, question: &str) -> Self {
        let resolved = resolve_path(file_path);
        let normalized = normalize(question);

        let mut hasher = Sha256::new();
        hasher.update(resolved.as_bytes());
        // Separator byte prevents (path, question) boundary ambiguity
        hasher.update([0u8]);
        hasher.update(normalized.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Hex representation, used as the stable id in snapshot artifacts.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for QueryFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix is enough for log lines
        for b in &self.0[..6] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Lexically normalize a path: strip `.` components and redundant
/// separators. Does not touch the filesystem, so missing files still
/// fingerprint deterministically.
fn resolve_path(file_path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in Path::new(file_path).components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else {
                    parts.push("..");
                }
            }
            other => {
                if let Some(s) = other.as_os_str().to_str() {
                    parts.push(s);
                }
            }
        }
    }
    parts.join("/")
}
