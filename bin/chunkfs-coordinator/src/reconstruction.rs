//! File reconstruction
//!
//! Chunks are fetched in sequence order. For each chunk, replicas whose push
//! was acknowledged are tried before those that failed; the first replica
//! returning the full chunk wins. If no replica can serve a chunk the whole
//! download fails and nothing partial is returned.

use bytes::{Bytes, BytesMut};
use chunkfs_client::ChunkTransport;
use chunkfs_common::{ChunkRecord, Error, FileId, Result};
use chunkfs_meta_store::MetaStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A fully reassembled file
#[derive(Clone, Debug)]
pub struct ReconstructedFile {
    pub file_id: FileId,
    /// Filename recorded at upload time
    pub filename: String,
    pub bytes: Bytes,
}

/// Reassembles files from their replicas
pub struct Reconstructor {
    store: Arc<MetaStore>,
    transport: Arc<dyn ChunkTransport>,
}

impl Reconstructor {
    pub fn new(store: Arc<MetaStore>, transport: Arc<dyn ChunkTransport>) -> Self {
        Self { store, transport }
    }

    pub async fn reconstruct(&self, file_id: &str) -> Result<ReconstructedFile> {
        let record = self
            .store
            .get_file(&FileId::new_unchecked(file_id))
            .ok_or_else(|| Error::FileNotFound(file_id.to_string()))?;

        let mut chunks = record.chunks;
        chunks.sort_by_key(|c| c.sequence);

        let mut out = BytesMut::with_capacity(usize::try_from(record.size_bytes).unwrap_or(0));
        for chunk in &chunks {
            let data = self.fetch_chunk(chunk).await?;
            out.extend_from_slice(&data);
        }

        info!(
            "Download complete: file={} size={} chunks={}",
            record.file_id,
            out.len(),
            chunks.len()
        );
        Ok(ReconstructedFile {
            file_id: record.file_id,
            filename: record.filename,
            bytes: out.freeze(),
        })
    }

    async fn fetch_chunk(&self, chunk: &ChunkRecord) -> Result<Bytes> {
        for endpoint in chunk.preferred_endpoints() {
            match self.transport.fetch_chunk(endpoint, &chunk.chunk_id).await {
                Ok(data) if data.is_empty() => {
                    warn!("Replica {} returned empty chunk {}", endpoint, chunk.chunk_id);
                }
                Ok(data) if data.len() as u64 != chunk.size_bytes => {
                    warn!(
                        "Replica {} returned {} bytes for chunk {} (expected {})",
                        endpoint,
                        data.len(),
                        chunk.chunk_id,
                        chunk.size_bytes
                    );
                }
                Ok(data) => {
                    debug!("Fetched chunk {} from {}", chunk.chunk_id, endpoint);
                    return Ok(data);
                }
                Err(e) => {
                    warn!("Chunk {} unavailable on {}: {}", chunk.chunk_id, endpoint, e);
                }
            }
        }

        Err(Error::ChunkUnretrievable {
            chunk_id: chunk.chunk_id.to_string(),
        })
    }
}
