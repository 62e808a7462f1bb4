//! JSON bodies exchanged with the coordinator and the storage nodes

use chunkfs_common::{FileId, FileRecord, NodeState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Multipart field carrying file and chunk payloads
pub const PAYLOAD_FIELD: &str = "file";

/// Body of every non-2xx response
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// `GET /ping` on either service
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub status: String,
    /// Server wall clock, Unix milliseconds
    pub time: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub node_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub status: String,
}

/// Result of `POST /upload`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub file_id: FileId,
    pub filename: String,
    pub chunks: usize,
    pub size_bytes: u64,
    pub replicas_committed: usize,
    pub replicas_failed: usize,
    /// Chunks with at least one failed replica
    pub degraded_chunks: usize,
    /// Chunks no storage node acknowledged
    pub unreplicated_chunks: usize,
    /// An earlier upload with the same file id was overwritten
    pub replaced: bool,
}

/// One storage node in `GET /status`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node_id: String,
    pub last_heartbeat: u64,
    pub age_ms: u64,
    pub state: NodeState,
    #[serde(default)]
    pub registration_info: serde_json::Map<String, serde_json::Value>,
}

/// `GET /status`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub datanodes: BTreeMap<String, NodeStatus>,
    #[serde(default)]
    pub files: BTreeMap<FileId, FileRecord>,
}

/// `POST /store_chunk/{chunk_id}` on a storage node
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreChunkResponse {
    pub status: String,
    pub chunk: String,
}
