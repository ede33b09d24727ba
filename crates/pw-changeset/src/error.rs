// error.rs — Error types for the changeset subsystem.
//
// Malformed-but-recoverable responses never surface here: truncation and
// patch misses are reported as values on ChangeSet / MergeResult. Only a
// response with no usable structure at all, or an unusable grammar, is an
// error.

use thiserror::Error;

/// Errors that can occur while parsing or configuring the wire format.
#[derive(Debug, Error)]
pub enum ChangeSetError {
    /// The response contained no recognizable file block at all.
    #[error("no file content found in response ({chars} characters)")]
    NoFileContent { chars: usize },

    /// A grammar pattern failed to compile.
    #[error("invalid grammar pattern '{pattern}': {source}")]
    InvalidGrammar {
        pattern: String,
        source: regex::Error,
    },

    /// A grammar pattern compiled but lacks a required capture group.
    #[error("grammar pattern '{pattern}' is missing capture group '{group}'")]
    MissingCaptureGroup { pattern: String, group: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
