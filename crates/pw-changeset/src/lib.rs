//! # pw-changeset
//!
//! The generation-response data model for Patchwork.
//!
//! A model response arrives as untrusted, possibly truncated text. This crate
//! turns it into a [`ParsedResponse`] (whole-file [`ChangeSet`] or
//! [`SearchReplaceChangeSet`]), applies it onto a [`FileMap`] with the merge
//! engine, and computes line diffs for human review.
//!
//! ## Key components
//!
//! - [`parse_response`] — wire-format parser with truncation recovery
//! - [`merge`] — applies a parsed response onto a base file map
//! - [`compute_diff`] — line-level diff between two file maps
//! - [`MarkerGrammar`] / [`SearchReplaceGrammar`] — versioned, configurable
//!   block delimiters

pub mod changeset;
pub mod clean;
pub mod continuation;
pub mod diff;
pub mod error;
pub mod grammar;
pub mod merge;
pub mod parser;

pub use changeset::{
    ChangeSet, FileMap, ParsedResponse, Replacement, SearchReplaceChange, SearchReplaceChangeSet,
};
pub use clean::clean_content;
pub use continuation::ContinuationInfo;
pub use diff::{compute_diff, DiffLine, DiffReport, FileDiff, FileDiffStatus, LineKind};
pub use error::ChangeSetError;
pub use grammar::{
    CompiledGrammar, MarkerGrammar, ResponseFormat, SearchReplaceGrammar, WireGrammar,
};
pub use merge::{merge, MergeIssue, MergeIssueKind, MergeResult, MergeStats};
pub use parser::progress::{
    scan_progress, FileProgress, FileStreamStatus, ProgressScanner, StreamProgress,
};
pub use parser::{parse_response, ResponseParser};
