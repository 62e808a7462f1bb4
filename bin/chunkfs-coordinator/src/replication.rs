//! Replication orchestrator
//!
//! An upload is read in `chunk_size` windows. Each window becomes one chunk
//! and is pushed to every configured storage node concurrently; chunks
//! themselves are processed one after another. A failed push is recorded
//! against that replica and never aborts the upload. The file record is
//! committed only after the last chunk has been fanned out.

use bytes::Bytes;
use chunkfs_client::ChunkTransport;
use chunkfs_common::{
    ChunkId, ChunkRecord, FileId, FileRecord, Replica, ReplicaStatus, Result, now_millis,
};
use chunkfs_meta_store::MetaStore;
use futures::future::join_all;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

/// Outcome of one upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadReport {
    pub file_id: FileId,
    /// Sanitized filename the file is stored under
    pub filename: String,
    pub size_bytes: u64,
    pub chunks: usize,
    pub replicas_committed: usize,
    pub replicas_failed: usize,
    /// Chunks with at least one failed replica
    pub degraded_chunks: usize,
    /// Chunks no storage node acknowledged
    pub unreplicated_chunks: usize,
    /// An existing file with the same id was overwritten
    pub replaced: bool,
}

/// Chunks uploads and fans chunks out to storage nodes
pub struct Orchestrator {
    store: Arc<MetaStore>,
    transport: Arc<dyn ChunkTransport>,
    /// Base URLs of every storage node, in fan-out order
    endpoints: Vec<String>,
    chunk_size: usize,
}

impl Orchestrator {
    pub fn new(
        store: Arc<MetaStore>,
        transport: Arc<dyn ChunkTransport>,
        endpoints: Vec<String>,
        chunk_size: usize,
    ) -> Self {
        Self {
            store,
            transport,
            endpoints,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Chunk `reader` and replicate it under the id derived from
    /// `raw_filename`.
    pub async fn upload<R>(&self, raw_filename: &str, reader: R) -> Result<UploadReport>
    where
        R: AsyncRead + Send,
    {
        let (file_id, filename) = FileId::derive(raw_filename)?;
        let mut reader = std::pin::pin!(reader);

        let mut chunks = Vec::new();
        let mut size_bytes = 0u64;
        for sequence in 0u64.. {
            let window = read_window(&mut reader, self.chunk_size).await?;
            if window.is_empty() {
                break;
            }
            size_bytes += window.len() as u64;

            let chunk_id = ChunkId::for_sequence(&file_id, sequence);
            let replicas = self.fan_out(&chunk_id, window.clone()).await;
            chunks.push(ChunkRecord {
                chunk_id,
                sequence,
                size_bytes: window.len() as u64,
                replicas,
            });
            if window.len() < self.chunk_size {
                break;
            }
        }

        let report = UploadReport {
            file_id: file_id.clone(),
            filename: filename.clone(),
            size_bytes,
            chunks: chunks.len(),
            replicas_committed: chunks.iter().map(ChunkRecord::committed_count).sum(),
            replicas_failed: chunks
                .iter()
                .map(|c| c.replicas.len() - c.committed_count())
                .sum(),
            degraded_chunks: chunks
                .iter()
                .filter(|c| c.committed_count() < c.replicas.len())
                .count(),
            unreplicated_chunks: chunks.iter().filter(|c| c.committed_count() == 0).count(),
            replaced: false,
        };

        let record = FileRecord {
            file_id: file_id.clone(),
            filename,
            size_bytes,
            chunk_size_bytes: self.chunk_size as u64,
            chunks,
            uploaded_at: now_millis(),
        };
        let previous = self.store.upsert_file(record)?;
        if let Some(previous) = &previous {
            warn!(
                "File {} overwritten (previously uploaded as {})",
                file_id, previous.filename
            );
        }

        info!(
            "Upload complete: file={} size={} chunks={} committed={} failed={}",
            file_id, size_bytes, report.chunks, report.replicas_committed, report.replicas_failed
        );
        if report.unreplicated_chunks > 0 {
            warn!(
                "File {} has {} chunk(s) with no committed replica",
                file_id, report.unreplicated_chunks
            );
        }

        Ok(UploadReport {
            replaced: previous.is_some(),
            ..report
        })
    }

    /// Push one chunk to every storage node, returning one replica entry per
    /// endpoint in configuration order.
    async fn fan_out(&self, chunk_id: &ChunkId, data: Bytes) -> Vec<Replica> {
        let pushes = self.endpoints.iter().map(|endpoint| {
            let data = data.clone();
            async move {
                let status = match self.transport.store_chunk(endpoint, chunk_id, data).await {
                    Ok(()) => {
                        debug!("Chunk {} committed on {}", chunk_id, endpoint);
                        ReplicaStatus::Committed
                    }
                    Err(e) => {
                        warn!("Chunk {} not stored on {}: {}", chunk_id, endpoint, e);
                        ReplicaStatus::Failed
                    }
                };
                Replica {
                    endpoint: endpoint.clone(),
                    status,
                }
            }
        });
        join_all(pushes).await
    }
}

/// Read up to `size` bytes, stopping early only at end of stream
async fn read_window<R>(reader: &mut R, size: usize) -> std::io::Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(Bytes::from(buf))
}
