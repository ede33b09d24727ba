//! # pw-workspace
//!
//! Project state for Patchwork: the versioned history of file snapshots,
//! the per-context record of what the model was last shown, and the review
//! gate that stands between a merged candidate and the history.
//!
//! ## Key components
//!
//! - [`VersionedFileStore`] — linear undo/redo history with checkpoints and
//!   time travel
//! - [`HistoryFileStore`] — JSON persistence for exported history
//! - [`FileContextRegistry`] — per-context fingerprints and prompt deltas
//! - [`ReviewGate`] — diff review before a candidate is committed

pub mod context;
pub mod error;
pub mod hasher;
pub mod history;
pub mod history_store;
pub mod review;

pub use context::{FileContextRegistry, FileContextState, FileDelta, FileFingerprint};
pub use error::WorkspaceError;
pub use history::{EntryKind, HistoryEntry, HistoryExport, VersionedFileStore};
pub use history_store::HistoryFileStore;
pub use review::{PendingReview, ReviewGate, ReviewOutcome};
