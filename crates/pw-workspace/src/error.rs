// error.rs — Error types for the workspace subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during history, context or review operations.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to serialize/deserialize history data.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Time travel to an index outside the history.
    #[error("history index {index} out of bounds (history has {len} entries)")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Restored history violates the store's invariants.
    #[error("invalid history: {0}")]
    InvalidHistory(String),

    /// No checkpoint carries the requested name.
    #[error("checkpoint not found: '{0}'")]
    CheckpointNotFound(String),

    /// Confirm/cancel called with nothing under review.
    #[error("no pending review")]
    NoPendingReview,

    /// A new candidate arrived while another was still under review.
    #[error("a review is already pending: '{label}'")]
    ReviewAlreadyPending { label: String },
}
