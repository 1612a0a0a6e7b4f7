//! On-disk snapshot of index vectors.
//!
//! Fixed-layout little-endian binary file:
//!
//! ```text
//! [magic: 4 bytes "CWVX"] [version: u32] [dimension: u32] [count: u32]
//! [count entries: slot id u64, then dimension f32 values]
//! ```
//!
//! A missing file loads as `None`; a malformed file is
//! [`IndexError::SnapshotCorrupted`] so the caller can start empty and log.
//! Writes go through a temp file and rename so a crash mid-write never
//! leaves a truncated snapshot behind.

use crate::error::{IndexError, IndexResult};
use crate::index::SlotId;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

const MAGIC: &[u8; 4] = b"CWVX";
const VERSION: u32 = 1;

/// Reader/writer for one snapshot file.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    path: PathBuf,
}

impl IndexSnapshot {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write all entries to disk, replacing any previous snapshot.
    ///
    /// # Errors
    /// I/O failures and entry/dimension disagreements.
    pub fn save(&self, dimension: usize, entries: &[(SlotId, Vec<f32>)]) -> IndexResult<()> {
        for (_, vector) in entries {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
        }

        let mut buffer =
            Vec::with_capacity(16 + entries.len() * (8 + dimension * 4));
        buffer.extend_from_slice(MAGIC);
        buffer.extend_from_slice(&VERSION.to_le_bytes());
        buffer.extend_from_slice(&(dimension as u32).to_le_bytes());
        buffer.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        for (id, vector) in entries {
            buffer.extend_from_slice(&id.to_le_bytes());
            for value in vector {
                buffer.extend_from_slice(&value.to_le_bytes());
            }
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&buffer)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;

        info!(
            path = %self.path.display(),
            entries = entries.len(),
            "saved index snapshot"
        );
        Ok(())
    }

    /// Read the snapshot back, or `None` when no file exists yet.
    ///
    /// # Errors
    /// I/O failures; [`IndexError::SnapshotCorrupted`] on bad magic,
    /// unknown version, or truncation.
    pub fn load(&self) -> IndexResult<Option<(usize, Vec<(SlotId, Vec<f32>)>)>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(IndexError::Snapshot(e)),
        };

        if data.len() < 16 {
            return Err(IndexError::SnapshotCorrupted("truncated header".to_string()));
        }
        if &data[0..4] != MAGIC {
            return Err(IndexError::SnapshotCorrupted("bad magic bytes".to_string()));
        }
        let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        if version != VERSION {
            return Err(IndexError::SnapshotCorrupted(format!(
                "unsupported version {version}"
            )));
        }
        let dimension = u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize;
        let count = u32::from_le_bytes([data[12], data[13], data[14], data[15]]) as usize;

        let entry_size = 8 + dimension * 4;
        let expected = 16 + count * entry_size;
        if data.len() != expected {
            return Err(IndexError::SnapshotCorrupted(format!(
                "expected {expected} bytes for {count} entries, found {}",
                data.len()
            )));
        }

        let mut entries = Vec::with_capacity(count);
        let mut offset = 16;
        for _ in 0..count {
            let id = u64::from_le_bytes(
                data[offset..offset + 8]
                    .try_into()
                    .map_err(|_| IndexError::SnapshotCorrupted("short entry".to_string()))?,
            );
            offset += 8;
            let mut vector = Vec::with_capacity(dimension);
            for _ in 0..dimension {
                let value = f32::from_le_bytes(
                    data[offset..offset + 4]
                        .try_into()
                        .map_err(|_| IndexError::SnapshotCorrupted("short entry".to_string()))?,
                );
                vector.push(value);
                offset += 4;
            }
            entries.push((id, vector));
        }

        Ok(Some((dimension, entries)))
    }
}
