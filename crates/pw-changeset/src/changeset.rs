// changeset.rs — Structured representation of a parsed model response.
//
// A response is one of two wire formats, so the parse result is a tagged
// variant: a whole-file ChangeSet or a SearchReplaceChangeSet. Downstream
// code (merge, controller) matches on ParsedResponse exhaustively instead of
// probing optional fields.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::continuation::ContinuationInfo;
use crate::grammar::ResponseFormat;

/// Project-relative path → full text content. The canonical "project" value.
pub type FileMap = BTreeMap<String, String>;

/// A whole-file change-set produced from a marker-format response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeSet {
    /// Prose outside of file blocks, with any directive removed.
    pub explanation: String,

    /// Created or updated files with their cleaned, complete content.
    pub files: FileMap,

    /// Paths the response asked to delete.
    pub deleted: BTreeSet<String>,

    /// True when the response ended inside an open block.
    pub truncated: bool,

    /// Paths whose block was cut off. Never present in `files`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub incomplete_files: Vec<String>,

    /// Multi-batch metadata; `None` means the response is final.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation: Option<ContinuationInfo>,
}

impl ChangeSet {
    /// True when the change-set carries no file operation at all.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.deleted.is_empty()
    }
}

/// One exact-match substitution inside an existing file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Replacement {
    pub search: String,
    pub replace: String,
}

/// The change requested for a single file in search/replace mode.
///
/// Exactly one of three shapes: a new file with literal content, a list of
/// replacements against an existing file, or a deletion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchReplaceChange {
    /// A brand new file (or a full overwrite).
    New { content: String },
    /// Ordered replacements applied to the current content of the file.
    Edit { replacements: Vec<Replacement> },
    /// The file is removed.
    Delete,
}

/// A change-set produced from a search/replace-format response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchReplaceChangeSet {
    pub explanation: String,

    /// Per-path change, keyed by project-relative path.
    pub changes: BTreeMap<String, SearchReplaceChange>,

    pub truncated: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub incomplete_files: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation: Option<ContinuationInfo>,
}

/// The result of parsing one response, in whichever format it used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ParsedResponse {
    Marker(ChangeSet),
    SearchReplace(SearchReplaceChangeSet),
}

impl ParsedResponse {
    /// Which wire format produced this result.
    pub fn format(&self) -> ResponseFormat {
        match self {
            ParsedResponse::Marker(_) => ResponseFormat::Marker,
            ParsedResponse::SearchReplace(_) => ResponseFormat::SearchReplace,
        }
    }

    pub fn explanation(&self) -> &str {
        match self {
            ParsedResponse::Marker(cs) => &cs.explanation,
            ParsedResponse::SearchReplace(cs) => &cs.explanation,
        }
    }

    pub fn truncated(&self) -> bool {
        match self {
            ParsedResponse::Marker(cs) => cs.truncated,
            ParsedResponse::SearchReplace(cs) => cs.truncated,
        }
    }

    pub fn incomplete_files(&self) -> &[String] {
        match self {
            ParsedResponse::Marker(cs) => &cs.incomplete_files,
            ParsedResponse::SearchReplace(cs) => &cs.incomplete_files,
        }
    }

    pub fn continuation(&self) -> Option<&ContinuationInfo> {
        match self {
            ParsedResponse::Marker(cs) => cs.continuation.as_ref(),
            ParsedResponse::SearchReplace(cs) => cs.continuation.as_ref(),
        }
    }

    /// Every path this response creates, updates, edits or deletes.
    pub fn touched_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = match self {
            ParsedResponse::Marker(cs) => cs
                .files
                .keys()
                .chain(cs.deleted.iter())
                .cloned()
                .collect(),
            ParsedResponse::SearchReplace(cs) => cs.changes.keys().cloned().collect(),
        };
        paths.sort();
        paths.dedup();
        paths
    }

    /// True when at least one complete file operation was recovered.
    pub fn has_usable_files(&self) -> bool {
        match self {
            ParsedResponse::Marker(cs) => !cs.is_empty(),
            ParsedResponse::SearchReplace(cs) => !cs.changes.is_empty(),
        }
    }
}
