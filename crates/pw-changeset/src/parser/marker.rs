// marker.rs — Whole-file marker format.
//
//   <<<FILE create: src/App.tsx>>>
//   ...full content...
//   <<<END FILE>>>
//   <<<FILE delete: src/old.ts>>>
//
// A delete block is complete once its header line is read. A create/update
// block that never sees its closing line is the truncated block: its path is
// reported in `incomplete_files` and its partial content is discarded.

use crate::changeset::ChangeSet;
use crate::clean::clean_content;
use crate::grammar::CompiledGrammar;

use super::{join_prose, normalize_path, parse_directive};

enum State<'a> {
    Prose,
    Block {
        path: Option<String>,
        lines: Vec<&'a str>,
    },
    Directive(Vec<&'a str>),
}

/// Parse a marker-format response. `None` when no block header was found.
pub(crate) fn parse(raw: &str, grammar: &CompiledGrammar) -> Option<ChangeSet> {
    let mut cs = ChangeSet::default();
    let mut prose: Vec<&str> = Vec::new();
    let mut saw_header = false;
    let mut after_delete = false;
    let mut state = State::Prose;

    for line in raw.lines() {
        let trimmed = line.trim();
        state = match state {
            State::Prose => {
                if let Some(caps) = grammar.file_open.captures(trimmed) {
                    saw_header = true;
                    after_delete = false;
                    let path = normalize_path(&caps["path"]);
                    if &caps["action"] == "delete" {
                        if let Some(path) = path {
                            tracing::debug!(path = %path, "delete block");
                            cs.files.remove(&path);
                            cs.deleted.insert(path);
                        }
                        after_delete = true;
                        State::Prose
                    } else {
                        State::Block {
                            path,
                            lines: Vec::new(),
                        }
                    }
                } else if after_delete && grammar.file_close.is_match(trimmed) {
                    // Optional closing line of a delete block.
                    after_delete = false;
                    State::Prose
                } else if grammar.continuation_open.is_match(trimmed) {
                    after_delete = false;
                    State::Directive(Vec::new())
                } else {
                    after_delete = false;
                    prose.push(line);
                    State::Prose
                }
            }
            State::Block { path, mut lines } => {
                if grammar.file_close.is_match(trimmed) {
                    close_block(&mut cs, path, &lines);
                    State::Prose
                } else if let Some(caps) = grammar.file_open.captures(trimmed) {
                    // A new header inside an open block: the model skipped the
                    // closing line. Keep what we have and start over.
                    tracing::warn!(
                        path = path.as_deref().unwrap_or("<invalid>"),
                        "block closed implicitly by next header"
                    );
                    close_block(&mut cs, path, &lines);
                    let next = normalize_path(&caps["path"]);
                    if &caps["action"] == "delete" {
                        if let Some(next) = next {
                            cs.files.remove(&next);
                            cs.deleted.insert(next);
                        }
                        after_delete = true;
                        State::Prose
                    } else {
                        State::Block {
                            path: next,
                            lines: Vec::new(),
                        }
                    }
                } else {
                    lines.push(line);
                    State::Block { path, lines }
                }
            }
            State::Directive(mut lines) => {
                if grammar.continuation_close.is_match(trimmed) {
                    if let Some(info) = parse_directive(&lines) {
                        cs.continuation = Some(info);
                    }
                    State::Prose
                } else {
                    lines.push(line);
                    State::Directive(lines)
                }
            }
        };
    }

    match state {
        State::Prose => {}
        State::Block { path, lines } => {
            cs.truncated = true;
            if let Some(path) = path {
                tracing::debug!(path = %path, partial_lines = lines.len(), "incomplete block");
                // An earlier complete block for the same path is superseded.
                cs.files.remove(&path);
                cs.deleted.remove(&path);
                cs.incomplete_files.push(path);
            }
        }
        State::Directive(_) => {
            tracing::warn!("unterminated continuation directive dropped");
        }
    }

    if !saw_header {
        return None;
    }
    cs.explanation = join_prose(&prose);
    Some(cs)
}

fn close_block(cs: &mut ChangeSet, path: Option<String>, lines: &[&str]) {
    let Some(path) = path else {
        return;
    };
    tracing::debug!(path = %path, lines = lines.len(), "file block complete");
    cs.deleted.remove(&path);
    cs.files.insert(path, clean_content(&lines.join("\n")));
}
