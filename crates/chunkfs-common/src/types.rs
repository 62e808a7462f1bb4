//! Core type definitions for chunkfs
//!
//! This module defines the identifiers and metadata records shared by the
//! coordinator, the storage nodes and the CLI. Every record here is part of
//! the persisted metadata snapshot, so field names are part of the on-disk
//! format.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Default chunk size in bytes (~2 MB)
pub const DEFAULT_CHUNK_SIZE: usize = 2_048_000;

/// Maximum length of a sanitized upload filename
pub const MAX_FILENAME_LEN: usize = 200;

/// Maximum length of a chunk identifier
pub const MAX_CHUNK_ID_LEN: usize = 255;

/// Current wall-clock time in Unix milliseconds
#[must_use]
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Strip an uploaded filename down to a safe single path component.
///
/// Only the last path component is kept, whitespace becomes `_`, and any
/// character outside `[A-Za-z0-9._-]` is dropped. Leading and trailing dots
/// and underscores are trimmed.
pub fn sanitize_filename(raw: &str) -> Result<String, FileNameError> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('_')
            } else if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                Some(c)
            } else {
                None
            }
        })
        .collect();

    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        return Err(FileNameError::Empty);
    }
    if trimmed.len() > MAX_FILENAME_LEN {
        return Err(FileNameError::TooLong);
    }
    Ok(trimmed.to_string())
}

/// Identifier of a stored file: the upload filename minus its extension
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// Derive a file id from a raw upload filename.
    ///
    /// Returns the id together with the sanitized filename it was derived
    /// from. `report.final.pdf` becomes `report.final`.
    pub fn derive(raw_filename: &str) -> Result<(Self, String), FileNameError> {
        let filename = sanitize_filename(raw_filename)?;
        let stem = match filename.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => filename.clone(),
        };
        Ok((Self(stem), filename))
    }

    /// Create without validation (lookups by caller-supplied id)
    #[must_use]
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the file id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({:?})", self.0)
    }
}

/// Errors that can occur when deriving a file id from a filename
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileNameError {
    #[error("filename is empty after sanitization")]
    Empty,
    #[error("filename must be at most {MAX_FILENAME_LEN} characters")]
    TooLong,
}

/// Identifier of one chunk, `{file_id}_chunk_{sequence}`
///
/// Chunk ids double as file names in a storage node's chunk directory, so
/// parsing rejects anything that could escape that directory.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    /// Build the chunk id for a file's `sequence`-th chunk
    #[must_use]
    pub fn for_sequence(file_id: &FileId, sequence: u64) -> Self {
        Self(format!("{file_id}_chunk_{sequence}"))
    }

    /// Parse a chunk id received over the wire
    pub fn parse(id: impl Into<String>) -> Result<Self, ChunkIdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ChunkIdError::Empty);
        }
        if id.len() > MAX_CHUNK_ID_LEN {
            return Err(ChunkIdError::TooLong);
        }
        if let Some(c) = id
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '_' | '-'))
        {
            return Err(ChunkIdError::InvalidChar(c));
        }
        if id == "." || id == ".." {
            return Err(ChunkIdError::Reserved);
        }
        Ok(Self(id))
    }

    /// Get the chunk id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({:?})", self.0)
    }
}

/// Errors that can occur when parsing a chunk id
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkIdError {
    #[error("chunk id is empty")]
    Empty,
    #[error("chunk id must be at most {MAX_CHUNK_ID_LEN} characters")]
    TooLong,
    #[error("chunk id contains invalid character: {0:?}")]
    InvalidChar(char),
    #[error("chunk id is a reserved path name")]
    Reserved,
}

/// Outcome of pushing one chunk to one storage node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaStatus {
    /// The node acknowledged the chunk
    Committed,
    /// The push failed or timed out
    Failed,
}

/// One replica of a chunk: where it was sent and whether the push succeeded
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    /// Base URL of the storage node
    pub endpoint: String,
    pub status: ReplicaStatus,
}

/// Placement of one chunk of a file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: ChunkId,
    /// Position of this chunk within the file, starting at 0
    pub sequence: u64,
    pub size_bytes: u64,
    /// One entry per configured storage node, in configuration order
    pub replicas: Vec<Replica>,
}

impl ChunkRecord {
    /// Number of replicas whose push was acknowledged
    #[must_use]
    pub fn committed_count(&self) -> usize {
        self.replicas
            .iter()
            .filter(|r| r.status == ReplicaStatus::Committed)
            .count()
    }

    /// Endpoints in fetch order: committed replicas first, then failed ones,
    /// each group keeping its stored order.
    #[must_use]
    pub fn preferred_endpoints(&self) -> Vec<&str> {
        let committed = self
            .replicas
            .iter()
            .filter(|r| r.status == ReplicaStatus::Committed);
        let failed = self
            .replicas
            .iter()
            .filter(|r| r.status == ReplicaStatus::Failed);
        committed.chain(failed).map(|r| r.endpoint.as_str()).collect()
    }
}

/// Layout of one uploaded file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: FileId,
    /// Sanitized original filename, used for downloads
    pub filename: String,
    pub size_bytes: u64,
    pub chunk_size_bytes: u64,
    /// Chunks in sequence order
    pub chunks: Vec<ChunkRecord>,
    /// Commit time in Unix milliseconds
    pub uploaded_at: u64,
}

impl FileRecord {
    /// Whether chunk sequences run 0, 1, 2, ... in stored order
    #[must_use]
    pub fn sequences_contiguous(&self) -> bool {
        self.chunks
            .iter()
            .zip(0u64..)
            .all(|(chunk, expected)| chunk.sequence == expected)
    }
}

/// A registered storage node as seen by the coordinator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageNodeRecord {
    pub node_id: String,
    /// Last registration or heartbeat, Unix milliseconds
    pub last_heartbeat: u64,
    /// Body of the node's most recent registration call
    #[serde(default)]
    pub registration_info: serde_json::Map<String, serde_json::Value>,
}

/// Liveness of a storage node, derived from heartbeat recency
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// Heartbeat seen within the liveness window
    #[display("alive")]
    Alive,
    /// No heartbeat within the liveness window
    #[display("down")]
    Down,
}

/// The full metadata state; the unit of persistence
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    #[serde(rename = "datanodes", default)]
    pub storage_nodes: BTreeMap<String, StorageNodeRecord>,
    #[serde(default)]
    pub files: BTreeMap<FileId, FileRecord>,
}
