//! On-disk chunk directory
//!
//! Every chunk is a single file named by its chunk id. Writes go to a temp
//! file in the same directory and are renamed into place, so readers never
//! observe a partially written chunk and an overwrite replaces the whole file.

use bytes::Bytes;
use chunkfs_common::ChunkId;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// A directory of chunk files
#[derive(Clone, Debug)]
pub struct ChunkDir {
    root: PathBuf,
}

impl ChunkDir {
    /// Open `root`, creating it if needed
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        info!("Chunk directory: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn chunk_path(&self, chunk_id: &ChunkId) -> PathBuf {
        self.root.join(chunk_id.as_str())
    }

    /// Store `data` as `chunk_id`, replacing any previous copy
    pub fn write(&self, chunk_id: &ChunkId, data: &[u8]) -> io::Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.chunk_path(chunk_id)).map_err(|e| e.error)?;
        Ok(())
    }

    /// Read a chunk; `None` if it is not stored here
    pub fn read(&self, chunk_id: &ChunkId) -> io::Result<Option<Bytes>> {
        match std::fs::read(self.chunk_path(chunk_id)) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}
