// error.rs — Error types for the generation subsystem.

use std::path::PathBuf;

use pw_changeset::ChangeSetError;
use pw_workspace::WorkspaceError;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while driving a generation.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to serialize/deserialize event data.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The pipeline config file is not valid TOML for [`crate::PipelineConfig`].
    #[error("invalid config at {path}: {source}")]
    ConfigError {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Invalid state transition.
    #[error("invalid transition from {from} to {to} for generation {generation_id}")]
    InvalidTransition {
        generation_id: Uuid,
        from: String,
        to: String,
    },

    /// The generation's token was cancelled (preempted or stopped by the user).
    #[error("generation {0} was cancelled")]
    Cancelled(Uuid),

    /// No generation is in flight for this session.
    #[error("no active generation")]
    NoActiveGeneration,

    /// There is no continuation to run.
    #[error("no continuation pending")]
    NoContinuation,

    #[error(transparent)]
    ChangeSet(#[from] ChangeSetError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}
