//! chunkfs Coordinator
//!
//! Splits uploads into fixed-size chunks, fans every chunk out to all
//! configured storage nodes, records the layout in the metadata snapshot and
//! reassembles files on download.

pub mod error;
pub mod reconstruction;
pub mod replication;
pub mod service;

#[cfg(test)]
mod testing;

pub use error::ApiError;
pub use reconstruction::{ReconstructedFile, Reconstructor};
pub use replication::{Orchestrator, UploadReport};
pub use service::{AppState, router};
