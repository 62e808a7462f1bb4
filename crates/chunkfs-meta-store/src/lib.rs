//! chunkfs Metadata Store - snapshot-backed coordinator state
//!
//! This crate owns every file layout and storage node record the
//! coordinator knows about, persists them as a single JSON snapshot, and
//! derives node liveness from heartbeat recency.

pub mod liveness;
pub mod store;

// Re-exports
pub use liveness::{LivenessTracker, NodeLiveness, NodeState};
pub use store::{MetaStore, MetaStoreError, MetaStoreResult};
