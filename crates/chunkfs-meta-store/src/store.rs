//! Persistent metadata store backed by a JSON snapshot file.
//!
//! All state lives in one in-memory `MetadataSnapshot` behind a mutex. Every
//! mutation runs inside that critical section and rewrites the whole snapshot
//! before returning: the JSON is written to a temp file in the snapshot's
//! directory, fsynced, then renamed over the previous snapshot. If the write
//! fails the in-memory change is undone so memory and disk never diverge.

use chunkfs_common::{FileId, FileRecord, MetadataSnapshot, StorageNodeRecord};
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{error, info};

/// Error type for metadata store operations
#[derive(Debug, thiserror::Error)]
pub enum MetaStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to replace snapshot {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<MetaStoreError> for chunkfs_common::Error {
    fn from(e: MetaStoreError) -> Self {
        match e {
            MetaStoreError::Io(e) => Self::Io(e),
            MetaStoreError::Json(e) => Self::Serialization(e.to_string()),
            e @ MetaStoreError::Persist { .. } => Self::Internal(e.to_string()),
        }
    }
}

pub type MetaStoreResult<T> = Result<T, MetaStoreError>;

/// Process-wide metadata: file layouts and storage node records.
pub struct MetaStore {
    state: Mutex<MetadataSnapshot>,
    /// Snapshot file (None = in-memory only)
    path: Option<PathBuf>,
}

impl MetaStore {
    /// Open (or create) the snapshot at the given path.
    ///
    /// A missing or blank file starts an empty store; the parent directory
    /// is created if needed.
    pub fn open(path: impl AsRef<Path>) -> MetaStoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let snapshot = match std::fs::read(path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => MetadataSnapshot::default(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MetadataSnapshot::default(),
            Err(e) => return Err(e.into()),
        };

        info!(
            "Loaded metadata snapshot from {}: {} storage nodes, {} files",
            path.display(),
            snapshot.storage_nodes.len(),
            snapshot.files.len()
        );

        Ok(Self {
            state: Mutex::new(snapshot),
            path: Some(path.to_path_buf()),
        })
    }

    /// Create a store that never touches disk
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(MetadataSnapshot::default()),
            path: None,
        }
    }

    // ---- Reads ----

    /// Copy of the full current state
    #[must_use]
    pub fn snapshot(&self) -> MetadataSnapshot {
        self.state.lock().clone()
    }

    #[must_use]
    pub fn get_file(&self, file_id: &FileId) -> Option<FileRecord> {
        self.state.lock().files.get(file_id).cloned()
    }

    #[must_use]
    pub fn get_node(&self, node_id: &str) -> Option<StorageNodeRecord> {
        self.state.lock().storage_nodes.get(node_id).cloned()
    }

    // ---- Files ----

    /// Insert or replace a file layout. Returns the replaced record.
    pub fn upsert_file(&self, record: FileRecord) -> MetaStoreResult<Option<FileRecord>> {
        let mut state = self.state.lock();
        let file_id = record.file_id.clone();
        let replaced = state.files.insert(file_id.clone(), record);

        if let Err(e) = self.persist(&state) {
            match replaced {
                Some(previous) => state.files.insert(file_id.clone(), previous),
                None => state.files.remove(&file_id),
            };
            error!("Failed to persist file '{}': {}", file_id, e);
            return Err(e);
        }
        Ok(replaced)
    }

    // ---- Storage nodes ----

    /// Insert or replace a storage node record. Returns the replaced record.
    pub fn upsert_node(
        &self,
        record: StorageNodeRecord,
    ) -> MetaStoreResult<Option<StorageNodeRecord>> {
        let mut state = self.state.lock();
        let node_id = record.node_id.clone();
        let replaced = state.storage_nodes.insert(node_id.clone(), record);

        if let Err(e) = self.persist(&state) {
            match replaced {
                Some(previous) => state.storage_nodes.insert(node_id.clone(), previous),
                None => state.storage_nodes.remove(&node_id),
            };
            error!("Failed to persist storage node '{}': {}", node_id, e);
            return Err(e);
        }
        Ok(replaced)
    }

    /// Refresh a node's heartbeat timestamp.
    ///
    /// Returns `false` without writing anything if the node was never
    /// registered.
    pub fn touch_heartbeat(&self, node_id: &str, timestamp: u64) -> MetaStoreResult<bool> {
        let mut state = self.state.lock();
        let Some(node) = state.storage_nodes.get_mut(node_id) else {
            return Ok(false);
        };
        let previous = std::mem::replace(&mut node.last_heartbeat, timestamp);

        if let Err(e) = self.persist(&state) {
            if let Some(node) = state.storage_nodes.get_mut(node_id) {
                node.last_heartbeat = previous;
            }
            error!("Failed to persist heartbeat for '{}': {}", node_id, e);
            return Err(e);
        }
        Ok(true)
    }

    // ---- Persistence ----

    fn persist(&self, snapshot: &MetadataSnapshot) -> MetaStoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| MetaStoreError::Persist {
            path: path.clone(),
            source: e.error,
        })?;
        Ok(())
    }
}
