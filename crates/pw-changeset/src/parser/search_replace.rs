// search_replace.rs — Token-efficient search/replace format.
//
//   <<<EDIT: src/App.tsx>>>
//   <<<<<<< SEARCH
//   old text
//   =======
//   new text
//   >>>>>>> REPLACE
//   <<<END EDIT>>>
//   <<<NEW: src/util.ts>>>
//   ...content...
//   <<<END NEW>>>
//   <<<DELETE: src/legacy.ts>>>
//
// Search and replace bodies are kept verbatim: they must match the file
// byte-for-byte. Only NEW content goes through the cleaning step.

use crate::changeset::{Replacement, SearchReplaceChange, SearchReplaceChangeSet};
use crate::clean::clean_content;
use crate::grammar::CompiledGrammar;

use super::{join_prose, normalize_path, parse_directive};

enum Pair<'a> {
    Idle,
    Search(Vec<&'a str>),
    Replace(String, Vec<&'a str>),
}

enum State<'a> {
    Prose,
    Edit {
        path: Option<String>,
        replacements: Vec<Replacement>,
        pair: Pair<'a>,
    },
    New {
        path: Option<String>,
        lines: Vec<&'a str>,
    },
    Directive(Vec<&'a str>),
}

/// Parse a search/replace response. `None` when no block header was found.
pub(crate) fn parse(raw: &str, grammar: &CompiledGrammar) -> Option<SearchReplaceChangeSet> {
    let mut cs = SearchReplaceChangeSet::default();
    let mut prose: Vec<&str> = Vec::new();
    let mut saw_header = false;
    let mut state = State::Prose;

    for line in raw.lines() {
        let trimmed = line.trim();
        state = match state {
            State::Prose => {
                if let Some(next) = open_block(grammar, trimmed, &mut cs) {
                    saw_header = true;
                    next
                } else if grammar.continuation_open.is_match(trimmed) {
                    State::Directive(Vec::new())
                } else {
                    prose.push(line);
                    State::Prose
                }
            }
            State::Edit {
                path,
                mut replacements,
                pair,
            } => match pair {
                Pair::Idle => {
                    if grammar.edit_close.is_match(trimmed) {
                        close_edit(&mut cs, path, replacements);
                        State::Prose
                    } else if grammar.search_start.is_match(trimmed) {
                        State::Edit {
                            path,
                            replacements,
                            pair: Pair::Search(Vec::new()),
                        }
                    } else if is_header(grammar, trimmed) {
                        tracing::warn!(
                            path = path.as_deref().unwrap_or("<invalid>"),
                            "edit block closed implicitly by next header"
                        );
                        close_edit(&mut cs, path, replacements);
                        open_block(grammar, trimmed, &mut cs).unwrap_or(State::Prose)
                    } else {
                        // Commentary between pairs is ignored.
                        State::Edit {
                            path,
                            replacements,
                            pair: Pair::Idle,
                        }
                    }
                }
                Pair::Search(mut lines) => {
                    if grammar.divider.is_match(trimmed) {
                        State::Edit {
                            path,
                            replacements,
                            pair: Pair::Replace(lines.join("\n"), Vec::new()),
                        }
                    } else {
                        lines.push(line);
                        State::Edit {
                            path,
                            replacements,
                            pair: Pair::Search(lines),
                        }
                    }
                }
                Pair::Replace(search, mut lines) => {
                    if grammar.replace_end.is_match(trimmed) {
                        replacements.push(Replacement {
                            search,
                            replace: lines.join("\n"),
                        });
                        State::Edit {
                            path,
                            replacements,
                            pair: Pair::Idle,
                        }
                    } else {
                        lines.push(line);
                        State::Edit {
                            path,
                            replacements,
                            pair: Pair::Replace(search, lines),
                        }
                    }
                }
            },
            State::New { path, mut lines } => {
                if grammar.new_close.is_match(trimmed) {
                    if let Some(path) = path {
                        tracing::debug!(path = %path, lines = lines.len(), "new file block complete");
                        cs.changes.insert(
                            path,
                            SearchReplaceChange::New {
                                content: clean_content(&lines.join("\n")),
                            },
                        );
                    }
                    State::Prose
                } else {
                    lines.push(line);
                    State::New { path, lines }
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
        State::Edit { path, .. } | State::New { path, .. } => {
            cs.truncated = true;
            if let Some(path) = path {
                tracing::debug!(path = %path, "incomplete block");
                // Pairs or content from an earlier block for this path are
                // only part of what the model meant to write.
                cs.changes.remove(&path);
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

fn is_header(grammar: &CompiledGrammar, line: &str) -> bool {
    grammar.edit_open.is_match(line) || grammar.new_open.is_match(line) || grammar.delete.is_match(line)
}

/// Start the block opened by `line`, if it is a header. Deletions complete
/// immediately and leave the parser in prose.
fn open_block<'a>(
    grammar: &CompiledGrammar,
    line: &str,
    cs: &mut SearchReplaceChangeSet,
) -> Option<State<'a>> {
    if let Some(caps) = grammar.edit_open.captures(line) {
        return Some(State::Edit {
            path: normalize_path(&caps["path"]),
            replacements: Vec::new(),
            pair: Pair::Idle,
        });
    }
    if let Some(caps) = grammar.new_open.captures(line) {
        return Some(State::New {
            path: normalize_path(&caps["path"]),
            lines: Vec::new(),
        });
    }
    if let Some(caps) = grammar.delete.captures(line) {
        if let Some(path) = normalize_path(&caps["path"]) {
            tracing::debug!(path = %path, "delete block");
            cs.changes.insert(path, SearchReplaceChange::Delete);
        }
        return Some(State::Prose);
    }
    None
}

fn close_edit(cs: &mut SearchReplaceChangeSet, path: Option<String>, replacements: Vec<Replacement>) {
    let Some(path) = path else {
        return;
    };
    tracing::debug!(path = %path, pairs = replacements.len(), "edit block complete");
    match cs.changes.get_mut(&path) {
        Some(SearchReplaceChange::Edit { replacements: existing }) => {
            existing.extend(replacements);
        }
        Some(other) => {
            tracing::warn!(path = %path, "edit block replaces an earlier new/delete block");
            *other = SearchReplaceChange::Edit { replacements };
        }
        None => {
            cs.changes
                .insert(path, SearchReplaceChange::Edit { replacements });
        }
    }
}
