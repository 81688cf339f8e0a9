//! Error types for the reconciliation engine.

use thiserror::Error;

/// Errors raised by the sources, the checkpoint store and the run driver.
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP request failed before a response was received.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote API answered with a non-success status.
    #[error("{service} API error: {status} - {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// GraphQL response carried an `errors` array.
    #[error("GraphQL errors: {0}")]
    GraphQl(String),

    /// Comment and label update did not both report success.
    #[error("Issue annotation incomplete (comment created: {comment_created}, labels updated: {labels_updated})")]
    PartialAnnotation {
        comment_created: bool,
        labels_updated: bool,
    },

    /// Checkpoint store could not be read or written.
    #[error("Checkpoint store error: {0}")]
    Checkpoint(String),

    /// Persisted watermark is not an RFC 3339 timestamp.
    #[error("Invalid watermark {value:?}: {reason}")]
    InvalidWatermark { value: String, reason: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or malformed configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, SyncError>;
