//! In-memory chunk transport for unit tests

use async_trait::async_trait;
use bytes::Bytes;
use chunkfs_client::ChunkTransport;
use chunkfs_common::{ChunkId, Error, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Keeps chunks per endpoint; endpoints can be taken offline
#[derive(Default)]
pub struct MemoryTransport {
    chunks: Mutex<HashMap<(String, String), Bytes>>,
    offline: Mutex<HashSet<String>>,
}

impl MemoryTransport {
    pub fn set_offline(&self, endpoint: &str, offline: bool) {
        let mut set = self.offline.lock();
        if offline {
            set.insert(endpoint.to_string());
        } else {
            set.remove(endpoint);
        }
    }

    pub fn stored(&self, endpoint: &str, chunk_id: &str) -> Option<Bytes> {
        self.chunks
            .lock()
            .get(&(endpoint.to_string(), chunk_id.to_string()))
            .cloned()
    }

    pub fn put(&self, endpoint: &str, chunk_id: &str, data: &'static [u8]) {
        self.chunks.lock().insert(
            (endpoint.to_string(), chunk_id.to_string()),
            Bytes::from_static(data),
        );
    }

    pub fn chunk_count(&self, endpoint: &str) -> usize {
        self.chunks
            .lock()
            .keys()
            .filter(|(e, _)| e == endpoint)
            .count()
    }

    fn check_online(&self, endpoint: &str) -> Result<()> {
        if self.offline.lock().contains(endpoint) {
            Err(Error::upstream(endpoint, "connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChunkTransport for MemoryTransport {
    async fn store_chunk(&self, endpoint: &str, chunk_id: &ChunkId, data: Bytes) -> Result<()> {
        self.check_online(endpoint)?;
        self.chunks
            .lock()
            .insert((endpoint.to_string(), chunk_id.to_string()), data);
        Ok(())
    }

    async fn fetch_chunk(&self, endpoint: &str, chunk_id: &ChunkId) -> Result<Bytes> {
        self.check_online(endpoint)?;
        self.stored(endpoint, chunk_id.as_str())
            .ok_or_else(|| Error::ChunkNotFound(chunk_id.to_string()))
    }
}
