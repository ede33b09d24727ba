// grammar.rs — Versioned wire grammar for model responses.
//
// Block delimiters are product conventions that change between prompt
// versions, so they are data, not code. Each delimiter is a regex matched
// against a whole (trimmed) line. The defaults are grammar v1; any field can
// be overridden from `.pw/pipeline.toml`.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ChangeSetError;

/// Which wire format to parse a response as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Detect from the response text.
    #[default]
    Auto,
    /// Whole-file blocks tagged create/update/delete.
    Marker,
    /// Search/replace pairs for existing files, literal content for new ones.
    SearchReplace,
}

/// Delimiters of the whole-file marker format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MarkerGrammar {
    /// Opening line; must capture `action` (create|update|delete) and `path`.
    pub file_open: String,
    pub file_close: String,
}

impl MarkerGrammar {
    pub fn v1() -> Self {
        Self {
            file_open: r"^<<<\s*FILE\s+(?P<action>create|update|delete)\s*:\s*(?P<path>\S+?)\s*>>>$"
                .to_string(),
            file_close: r"^<<<\s*END\s+FILE\s*>>>$".to_string(),
        }
    }
}

impl Default for MarkerGrammar {
    fn default() -> Self {
        Self::v1()
    }
}

/// Delimiters of the search/replace format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchReplaceGrammar {
    /// Opens the edit block of an existing file; must capture `path`.
    pub edit_open: String,
    pub edit_close: String,
    /// Opens a new-file block; must capture `path`.
    pub new_open: String,
    pub new_close: String,
    /// Single-line deletion; must capture `path`.
    pub delete: String,
    pub search_start: String,
    pub divider: String,
    pub replace_end: String,
}

impl SearchReplaceGrammar {
    pub fn v1() -> Self {
        Self {
            edit_open: r"^<<<\s*EDIT\s*:\s*(?P<path>\S+?)\s*>>>$".to_string(),
            edit_close: r"^<<<\s*END\s+EDIT\s*>>>$".to_string(),
            new_open: r"^<<<\s*NEW\s*:\s*(?P<path>\S+?)\s*>>>$".to_string(),
            new_close: r"^<<<\s*END\s+NEW\s*>>>$".to_string(),
            delete: r"^<<<\s*DELETE\s*:\s*(?P<path>\S+?)\s*>>>$".to_string(),
            search_start: r"^<{7}\s*SEARCH$".to_string(),
            divider: r"^={7}$".to_string(),
            replace_end: r"^>{7}\s*REPLACE$".to_string(),
        }
    }
}

impl Default for SearchReplaceGrammar {
    fn default() -> Self {
        Self::v1()
    }
}

/// The complete wire grammar: both formats plus the continuation directive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WireGrammar {
    pub version: u32,
    pub marker: MarkerGrammar,
    pub search_replace: SearchReplaceGrammar,
    pub continuation_open: String,
    pub continuation_close: String,
}

impl WireGrammar {
    pub fn v1() -> Self {
        Self {
            version: 1,
            marker: MarkerGrammar::v1(),
            search_replace: SearchReplaceGrammar::v1(),
            continuation_open: r"^<<<\s*CONTINUATION\s*>>>$".to_string(),
            continuation_close: r"^<<<\s*END\s+CONTINUATION\s*>>>$".to_string(),
        }
    }

    /// Compile every delimiter, checking required capture groups.
    pub fn compile(&self) -> Result<CompiledGrammar, ChangeSetError> {
        let sr = &self.search_replace;
        Ok(CompiledGrammar {
            version: self.version,
            file_open: compile_with_groups(&self.marker.file_open, &["action", "path"])?,
            file_close: compile_with_groups(&self.marker.file_close, &[])?,
            edit_open: compile_with_groups(&sr.edit_open, &["path"])?,
            edit_close: compile_with_groups(&sr.edit_close, &[])?,
            new_open: compile_with_groups(&sr.new_open, &["path"])?,
            new_close: compile_with_groups(&sr.new_close, &[])?,
            delete: compile_with_groups(&sr.delete, &["path"])?,
            search_start: compile_with_groups(&sr.search_start, &[])?,
            divider: compile_with_groups(&sr.divider, &[])?,
            replace_end: compile_with_groups(&sr.replace_end, &[])?,
            continuation_open: compile_with_groups(&self.continuation_open, &[])?,
            continuation_close: compile_with_groups(&self.continuation_close, &[])?,
        })
    }
}

impl Default for WireGrammar {
    fn default() -> Self {
        Self::v1()
    }
}

fn compile_with_groups(pattern: &str, groups: &[&str]) -> Result<Regex, ChangeSetError> {
    let regex = Regex::new(pattern).map_err(|source| ChangeSetError::InvalidGrammar {
        pattern: pattern.to_string(),
        source,
    })?;
    for group in groups {
        if !regex.capture_names().flatten().any(|name| name == *group) {
            return Err(ChangeSetError::MissingCaptureGroup {
                pattern: pattern.to_string(),
                group: group.to_string(),
            });
        }
    }
    Ok(regex)
}

/// A [`WireGrammar`] with every delimiter compiled.
#[derive(Debug, Clone)]
pub struct CompiledGrammar {
    pub version: u32,
    pub file_open: Regex,
    pub file_close: Regex,
    pub edit_open: Regex,
    pub edit_close: Regex,
    pub new_open: Regex,
    pub new_close: Regex,
    pub delete: Regex,
    pub search_start: Regex,
    pub divider: Regex,
    pub replace_end: Regex,
    pub continuation_open: Regex,
    pub continuation_close: Regex,
}

impl CompiledGrammar {
    /// Pick a concrete format for `text`: search/replace when any of its
    /// headers appears, marker otherwise.
    pub fn detect(&self, text: &str) -> ResponseFormat {
        let is_search_replace = text.lines().map(str::trim).any(|line| {
            self.edit_open.is_match(line)
                || self.new_open.is_match(line)
                || self.delete.is_match(line)
        });
        if is_search_replace {
            ResponseFormat::SearchReplace
        } else {
            ResponseFormat::Marker
        }
    }
}
