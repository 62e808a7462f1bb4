//! chunkfs Client - HTTP clients and wire types
//!
//! `HttpChunkClient` pushes and fetches chunks on storage nodes and is the
//! production `ChunkTransport`. `CoordinatorClient` speaks to the
//! coordinator on behalf of storage nodes (register, heartbeat) and the CLI.

pub mod api;
pub mod coordinator;
pub mod transport;

// Re-exports
pub use coordinator::{CoordinatorClient, DownloadedFile};
pub use transport::{ChunkTransport, HttpChunkClient};
