// parser/mod.rs — Response parser entry point.
//
// parse() is pure: raw accumulated text in, ParsedResponse out. Both wire
// formats are line-oriented state machines over the same compiled grammar,
// and both recognise the continuation directive in their prose.
//
// Only a response with no block header at all is a hard failure. A response
// cut off mid-block is a successful parse with `truncated = true`.

pub mod marker;
pub mod progress;
pub mod search_replace;

use crate::changeset::ParsedResponse;
use crate::clean::clean_content;
use crate::continuation::ContinuationInfo;
use crate::error::ChangeSetError;
use crate::grammar::{CompiledGrammar, ResponseFormat, WireGrammar};

/// Parser bound to a compiled grammar and a format preference.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    grammar: CompiledGrammar,
    format: ResponseFormat,
}

impl ResponseParser {
    pub fn new(grammar: &WireGrammar, format: ResponseFormat) -> Result<Self, ChangeSetError> {
        Ok(Self {
            grammar: grammar.compile()?,
            format,
        })
    }

    /// Parser for grammar v1 with format auto-detection.
    pub fn v1() -> Result<Self, ChangeSetError> {
        Self::new(&WireGrammar::v1(), ResponseFormat::Auto)
    }

    pub fn grammar(&self) -> &CompiledGrammar {
        &self.grammar
    }

    /// Parse a complete response.
    pub fn parse(&self, raw: &str) -> Result<ParsedResponse, ChangeSetError> {
        let format = match self.format {
            ResponseFormat::Auto => self.grammar.detect(raw),
            explicit => explicit,
        };
        tracing::debug!(chars = raw.len(), ?format, "parsing response");

        let parsed = match format {
            ResponseFormat::SearchReplace => {
                search_replace::parse(raw, &self.grammar).map(ParsedResponse::SearchReplace)
            }
            ResponseFormat::Marker | ResponseFormat::Auto => {
                marker::parse(raw, &self.grammar).map(ParsedResponse::Marker)
            }
        };

        match parsed {
            Some(parsed) => {
                if parsed.truncated() {
                    tracing::info!(
                        incomplete = ?parsed.incomplete_files(),
                        "response truncated; complete blocks recovered"
                    );
                }
                Ok(parsed)
            }
            None => Err(ChangeSetError::NoFileContent { chars: raw.len() }),
        }
    }
}

/// Parse `raw` with grammar v1 and format auto-detection.
pub fn parse_response(raw: &str) -> Result<ParsedResponse, ChangeSetError> {
    ResponseParser::v1()?.parse(raw)
}

/// Normalize a path from a block header into a project-relative key.
///
/// Returns `None` for paths that would escape the project root.
pub(crate) fn normalize_path(raw: &str) -> Option<String> {
    let path = raw.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`');
    let unified = path.replace('\\', "/");
    let mut path = unified.as_str();
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    let path = path.trim_start_matches('/');
    if path.is_empty() || path.split('/').any(|segment| segment == "..") {
        tracing::warn!(path = raw, "ignoring block with unsafe path");
        return None;
    }
    Some(path.to_string())
}

/// Decode the body of a continuation directive.
///
/// A malformed directive is dropped and the response treated as final.
pub(crate) fn parse_directive(lines: &[&str]) -> Option<ContinuationInfo> {
    let body = clean_content(&lines.join("\n"));
    match serde_json::from_str::<ContinuationInfo>(&body) {
        Ok(info) => Some(info.normalize()),
        Err(e) => {
            tracing::warn!("dropping malformed continuation directive: {}", e);
            None
        }
    }
}

/// Join prose lines into the explanation text.
pub(crate) fn join_prose(lines: &[&str]) -> String {
    lines.join("\n").trim().to_string()
}
