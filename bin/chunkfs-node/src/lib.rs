//! chunkfs Storage Node
//!
//! Stores chunk replicas as one file per chunk in a local directory, serves
//! them back by id and keeps itself registered with the coordinator.

pub mod chunk_dir;
pub mod heartbeat;
pub mod service;

pub use chunk_dir::ChunkDir;
pub use heartbeat::HeartbeatTask;
pub use service::{NodeService, router};
