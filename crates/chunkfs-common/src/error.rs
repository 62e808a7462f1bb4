//! Error types for chunkfs
//!
//! This module defines the common error types used throughout the system.

use crate::types::{ChunkIdError, FileNameError};
use thiserror::Error;

/// Common result type for chunkfs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for chunkfs
#[derive(Debug, Error)]
pub enum Error {
    // Validation errors
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid filename: {0}")]
    InvalidFileName(#[from] FileNameError),

    #[error("invalid chunk id: {0}")]
    InvalidChunkId(#[from] ChunkIdError),

    // Lookup errors
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("chunk not found: {0}")]
    ChunkNotFound(String),

    #[error("unknown storage node: {0}")]
    NodeNotFound(String),

    // Storage node errors
    #[error("storage node {endpoint} unavailable: {reason}")]
    UpstreamUnavailable { endpoint: String, reason: String },

    #[error("request timeout")]
    Timeout,

    #[error("chunk {chunk_id} could not be retrieved from any replica")]
    ChunkUnretrievable { chunk_id: String },

    // Internal errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create an upstream error for a storage node endpoint
    pub fn upstream(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::UpstreamUnavailable {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if this is a retryable error
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::UpstreamUnavailable { .. })
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound(_) | Self::ChunkNotFound(_) | Self::NodeNotFound(_)
        )
    }

    /// Get the HTTP status code this error maps to
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidRequest(_) | Self::InvalidFileName(_) | Self::InvalidChunkId(_) => 400,

            // 404 Not Found
            Self::FileNotFound(_) | Self::ChunkNotFound(_) | Self::NodeNotFound(_) => 404,

            // 500 Internal Server Error
            Self::ChunkUnretrievable { .. }
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Internal(_) => 500,

            // 503 Service Unavailable
            Self::UpstreamUnavailable { .. } | Self::Timeout => 503,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(Error::Timeout.is_retryable());
        assert!(Error::upstream("http://a:1", "connection refused").is_retryable());
        assert!(!Error::FileNotFound("f".into()).is_retryable());
    }

    #[test]
    fn test_error_not_found() {
        assert!(Error::FileNotFound("f".into()).is_not_found());
        assert!(Error::NodeNotFound("n".into()).is_not_found());
        assert!(!Error::ChunkUnretrievable { chunk_id: "c".into() }.is_not_found());
    }

    #[test]
    fn test_error_http_status() {
        assert_eq!(Error::invalid_request("missing file").http_status_code(), 400);
        assert_eq!(Error::from(FileNameError::Empty).http_status_code(), 400);
        assert_eq!(Error::FileNotFound("f".into()).http_status_code(), 404);
        assert_eq!(Error::NodeNotFound("n".into()).http_status_code(), 404);
        assert_eq!(
            Error::ChunkUnretrievable { chunk_id: "c".into() }.http_status_code(),
            500
        );
        assert_eq!(Error::Timeout.http_status_code(), 503);
    }
}
