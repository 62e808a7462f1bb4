//! chunkfs Common - Shared types and utilities
//!
//! This crate provides the identifiers, metadata records, error type and
//! configuration shared by the coordinator, the storage node and the CLI.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
