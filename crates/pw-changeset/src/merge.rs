// merge.rs — Applies a parsed response onto a base file map.
//
// The merge is pure and never fails: a search block that does not match is
// recorded as an issue and the remaining pairs and files still apply.
// `success` summarises whether everything landed; callers decide whether a
// partial result is acceptable.

use serde::{Deserialize, Serialize};

use crate::changeset::{ChangeSet, FileMap, ParsedResponse, SearchReplaceChange, SearchReplaceChangeSet};

/// Per-operation counts for one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub replacements_applied: usize,
    pub replacements_failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeIssueKind {
    /// The search text was not found in the current content.
    SearchNotFound { search_preview: String },
    /// The search block was empty and would match anywhere.
    EmptySearch,
    /// An edit referenced a file that does not exist in the base.
    MissingTarget,
}

/// A single edit that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeIssue {
    pub path: String,
    pub reason: MergeIssueKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub files: FileMap,
    pub stats: MergeStats,
    pub errors: Vec<MergeIssue>,
    /// False iff a replacement failed or an edit targeted a missing file.
    pub success: bool,
}

impl MergeResult {
    fn finish(files: FileMap, stats: MergeStats, errors: Vec<MergeIssue>) -> Self {
        let missing_target = errors
            .iter()
            .any(|e| e.reason == MergeIssueKind::MissingTarget);
        let success = stats.replacements_failed == 0 && !missing_target;
        Self {
            files,
            stats,
            errors,
            success,
        }
    }

    /// Paths with at least one issue, deduplicated.
    pub fn failed_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.errors.iter().map(|e| e.path.as_str()).collect();
        paths.dedup();
        paths
    }
}

/// Apply a parsed response of either format onto `base`.
pub fn merge(base: &FileMap, parsed: &ParsedResponse) -> MergeResult {
    let result = match parsed {
        ParsedResponse::Marker(cs) => merge_whole_files(base, cs),
        ParsedResponse::SearchReplace(cs) => merge_search_replace(base, cs),
    };
    tracing::debug!(
        created = result.stats.created,
        updated = result.stats.updated,
        deleted = result.stats.deleted,
        applied = result.stats.replacements_applied,
        failed = result.stats.replacements_failed,
        "merge complete"
    );
    result
}

/// Whole-file mode: `{...base, ...files}` minus `deleted`.
pub fn merge_whole_files(base: &FileMap, cs: &ChangeSet) -> MergeResult {
    let mut files = base.clone();
    let mut stats = MergeStats::default();

    for (path, content) in &cs.files {
        match files.insert(path.clone(), content.clone()) {
            Some(_) => stats.updated += 1,
            None => stats.created += 1,
        }
    }
    for path in &cs.deleted {
        // Deleting a file that does not exist is a no-op.
        if files.remove(path).is_some() {
            stats.deleted += 1;
        }
    }

    MergeResult::finish(files, stats, Vec::new())
}

/// Search/replace mode: exact, case-sensitive, first occurrence, in order.
pub fn merge_search_replace(base: &FileMap, cs: &SearchReplaceChangeSet) -> MergeResult {
    let mut files = base.clone();
    let mut stats = MergeStats::default();
    let mut errors = Vec::new();

    for (path, change) in &cs.changes {
        match change {
            SearchReplaceChange::New { content } => {
                match files.insert(path.clone(), content.clone()) {
                    Some(_) => stats.updated += 1,
                    None => stats.created += 1,
                }
            }
            SearchReplaceChange::Delete => {
                if files.remove(path).is_some() {
                    stats.deleted += 1;
                }
            }
            SearchReplaceChange::Edit { replacements } => {
                let Some(current) = files.get_mut(path) else {
                    tracing::warn!(path = %path, "edit targets a file that does not exist");
                    errors.push(MergeIssue {
                        path: path.clone(),
                        reason: MergeIssueKind::MissingTarget,
                    });
                    continue;
                };

                let mut applied_here = 0;
                for replacement in replacements {
                    if replacement.search.is_empty() {
                        stats.replacements_failed += 1;
                        errors.push(MergeIssue {
                            path: path.clone(),
                            reason: MergeIssueKind::EmptySearch,
                        });
                        continue;
                    }
                    match current.find(&replacement.search) {
                        Some(start) => {
                            current.replace_range(
                                start..start + replacement.search.len(),
                                &replacement.replace,
                            );
                            applied_here += 1;
                        }
                        None => {
                            tracing::warn!(path = %path, "search block not found");
                            stats.replacements_failed += 1;
                            errors.push(MergeIssue {
                                path: path.clone(),
                                reason: MergeIssueKind::SearchNotFound {
                                    search_preview: preview(&replacement.search),
                                },
                            });
                        }
                    }
                }

                stats.replacements_applied += applied_here;
                if applied_here > 0 {
                    stats.updated += 1;
                }
            }
        }
    }

    MergeResult::finish(files, stats, errors)
}

/// First line of a search block, shortened for display.
fn preview(search: &str) -> String {
    const MAX: usize = 60;
    let first = search.lines().next().unwrap_or_default().trim();
    if first.chars().count() > MAX {
        let cut: String = first.chars().take(MAX).collect();
        format!("{}…", cut)
    } else {
        first.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::Replacement;

    fn base() -> FileMap {
        let mut files = FileMap::new();
        files.insert("a.txt".to_string(), "line1\nline2".to_string());
        files.insert("b.txt".to_string(), "keep".to_string());
        files
    }

    fn edit(path: &str, pairs: &[(&str, &str)]) -> SearchReplaceChangeSet {
        let mut cs = SearchReplaceChangeSet::default();
        cs.changes.insert(
            path.to_string(),
            SearchReplaceChange::Edit {
                replacements: pairs
                    .iter()
                    .map(|(s, r)| Replacement {
                        search: s.to_string(),
                        replace: r.to_string(),
                    })
                    .collect(),
            },
        );
        cs
    }

    #[test]
    fn empty_change_set_is_identity() {
        let result = merge(&base(), &ParsedResponse::Marker(ChangeSet::default()));
        assert_eq!(result.files, base());
        assert!(result.success);
        assert_eq!(result.stats, MergeStats::default());

        let result = merge(
            &base(),
            &ParsedResponse::SearchReplace(SearchReplaceChangeSet::default()),
        );
        assert_eq!(result.files, base());
    }

    #[test]
    fn whole_file_upserts_and_deletes() {
        let mut cs = ChangeSet::default();
        cs.files.insert("a.txt".to_string(), "new a".to_string());
        cs.files.insert("c.txt".to_string(), "c".to_string());
        cs.deleted.insert("b.txt".to_string());
        cs.deleted.insert("ghost.txt".to_string());

        let result = merge(&base(), &ParsedResponse::Marker(cs.clone()));
        assert_eq!(result.files["a.txt"], "new a");
        assert_eq!(result.files["c.txt"], "c");
        assert!(!result.files.contains_key("b.txt"));
        assert_eq!(result.stats.created, 1);
        assert_eq!(result.stats.updated, 1);
        assert_eq!(result.stats.deleted, 1);
        assert!(result.success);

        for path in cs.files.keys().filter(|p| !cs.deleted.contains(*p)) {
            assert!(result.files.contains_key(path));
        }
        for path in &cs.deleted {
            assert!(!result.files.contains_key(path));
        }
    }

    #[test]
    fn deleted_wins_over_files_with_same_path() {
        let mut cs = ChangeSet::default();
        cs.files.insert("x.txt".to_string(), "x".to_string());
        cs.deleted.insert("x.txt".to_string());
        let result = merge_whole_files(&base(), &cs);
        assert!(!result.files.contains_key("x.txt"));
    }

    #[test]
    fn replacement_appends_line() {
        let result = merge_search_replace(&base(), &edit("a.txt", &[("line2", "line2\nline3")]));
        assert_eq!(result.files["a.txt"], "line1\nline2\nline3");
        assert_eq!(result.stats.replacements_applied, 1);
        assert_eq!(result.stats.updated, 1);
        assert!(result.success);
    }

    #[test]
    fn replacement_miss_is_recorded_not_fatal() {
        let mut cs = edit("a.txt", &[("missing", "x")]);
        cs.changes.insert(
            "new.txt".to_string(),
            SearchReplaceChange::New {
                content: "fresh".to_string(),
            },
        );
        let result = merge_search_replace(&base(), &cs);
        assert_eq!(result.files["a.txt"], "line1\nline2");
        assert_eq!(result.files["new.txt"], "fresh");
        assert_eq!(result.stats.replacements_failed, 1);
        assert_eq!(result.stats.replacements_applied, 0);
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(
            result.errors[0].reason,
            MergeIssueKind::SearchNotFound {
                search_preview: "missing".to_string()
            }
        );
    }

    #[test]
    fn later_pairs_see_earlier_results() {
        let result = merge_search_replace(
            &base(),
            &edit("a.txt", &[("line1", "first"), ("first\nline2", "done")]),
        );
        assert_eq!(result.files["a.txt"], "done");
        assert_eq!(result.stats.replacements_applied, 2);
    }

    #[test]
    fn only_first_occurrence_is_replaced() {
        let mut files = FileMap::new();
        files.insert("r.txt".to_string(), "x x x".to_string());
        let result = merge_search_replace(&files, &edit("r.txt", &[("x", "y")]));
        assert_eq!(result.files["r.txt"], "y x x");
    }

    #[test]
    fn match_is_case_sensitive() {
        let result = merge_search_replace(&base(), &edit("a.txt", &[("LINE1", "x")]));
        assert_eq!(result.stats.replacements_failed, 1);
    }

    #[test]
    fn edit_of_missing_file_fails_without_counting_pairs() {
        let result = merge_search_replace(&base(), &edit("nope.txt", &[("a", "b")]));
        assert!(!result.success);
        assert_eq!(result.stats.replacements_failed, 0);
        assert_eq!(result.errors[0].reason, MergeIssueKind::MissingTarget);
        assert!(!result.files.contains_key("nope.txt"));
    }

    #[test]
    fn empty_search_is_a_failure() {
        let result = merge_search_replace(&base(), &edit("a.txt", &[("", "prefix")]));
        assert_eq!(result.files["a.txt"], "line1\nline2");
        assert_eq!(result.errors[0].reason, MergeIssueKind::EmptySearch);
        assert!(!result.success);
    }

    #[test]
    fn delete_of_missing_file_is_noop() {
        let mut cs = SearchReplaceChangeSet::default();
        cs.changes
            .insert("ghost.txt".to_string(), SearchReplaceChange::Delete);
        let result = merge_search_replace(&base(), &cs);
        assert_eq!(result.files, base());
        assert_eq!(result.stats.deleted, 0);
        assert!(result.success);
    }

    #[test]
    fn long_search_preview_is_shortened() {
        let long = "x".repeat(100);
        assert_eq!(preview(&long).chars().count(), 61);
    }
}
