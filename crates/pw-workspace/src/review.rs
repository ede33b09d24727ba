// review.rs — Diff review gate between a merged candidate and the history.
//
// A candidate file map is proposed, diffed against the store's current
// snapshot, and held until the user confirms (commit) or cancels (discard).
// Auto-accept skips the hold and commits directly.
//
// Files the parser reported as incomplete never reach the store through this
// gate: their base content is restored in the candidate before diffing.

use pw_changeset::{compute_diff, DiffReport, FileMap};
use serde::{Deserialize, Serialize};

use crate::error::WorkspaceError;
use crate::history::VersionedFileStore;

/// A candidate awaiting the user's decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReview {
    pub label: String,
    pub candidate_files: FileMap,
    /// Overwrite the current entry instead of appending a new one.
    pub skip_history: bool,
    pub incomplete_files: Vec<String>,
    pub diff: DiffReport,
}

/// What happened to a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReviewOutcome {
    /// Appended as a new history entry at `index`.
    Committed { index: usize, label: String },
    /// Replaced the files of the current entry in place.
    Overwritten { index: usize, label: String },
    /// Dropped; the store is untouched.
    Discarded { label: String },
}

/// Holds at most one pending review.
#[derive(Debug, Default)]
pub struct ReviewGate {
    pending: Option<PendingReview>,
}

impl ReviewGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&PendingReview> {
        self.pending.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Hold `candidate` for review against the store's current files.
    pub fn propose(
        &mut self,
        store: &VersionedFileStore,
        label: impl Into<String>,
        candidate: FileMap,
        skip_history: bool,
        incomplete_files: Vec<String>,
    ) -> Result<&PendingReview, WorkspaceError> {
        if let Some(existing) = &self.pending {
            return Err(WorkspaceError::ReviewAlreadyPending {
                label: existing.label.clone(),
            });
        }

        let base = store.current_files();
        let candidate = without_incomplete(base, candidate, &incomplete_files);
        let diff = compute_diff(base, &candidate);
        let label = label.into();

        tracing::info!(
            label = %label,
            files = diff.changed_files().count(),
            added = diff.total_added,
            removed = diff.total_removed,
            incomplete = incomplete_files.len(),
            "review pending"
        );

        Ok(self.pending.insert(PendingReview {
            label,
            candidate_files: candidate,
            skip_history,
            incomplete_files,
            diff,
        }))
    }

    /// Commit the pending candidate to `store`.
    pub fn confirm(
        &mut self,
        store: &mut VersionedFileStore,
    ) -> Result<ReviewOutcome, WorkspaceError> {
        let review = self.pending.take().ok_or(WorkspaceError::NoPendingReview)?;
        Ok(apply(store, review.label, review.candidate_files, review.skip_history))
    }

    /// Discard the pending candidate.
    pub fn cancel(&mut self) -> Result<ReviewOutcome, WorkspaceError> {
        let review = self.pending.take().ok_or(WorkspaceError::NoPendingReview)?;
        tracing::info!(label = %review.label, "review cancelled");
        Ok(ReviewOutcome::Discarded {
            label: review.label,
        })
    }

    /// Commit without holding for review. Incomplete files keep their base
    /// content (or stay absent if they did not exist).
    pub fn auto_accept(
        &mut self,
        store: &mut VersionedFileStore,
        label: impl Into<String>,
        candidate: FileMap,
        skip_history: bool,
        incomplete_files: &[String],
    ) -> Result<ReviewOutcome, WorkspaceError> {
        if let Some(existing) = &self.pending {
            return Err(WorkspaceError::ReviewAlreadyPending {
                label: existing.label.clone(),
            });
        }
        let candidate = without_incomplete(store.current_files(), candidate, incomplete_files);
        Ok(apply(store, label.into(), candidate, skip_history))
    }
}

fn apply(
    store: &mut VersionedFileStore,
    label: String,
    files: FileMap,
    skip_history: bool,
) -> ReviewOutcome {
    if skip_history {
        store.overwrite_current(files);
        let index = store.current_index();
        tracing::info!(label = %label, index, "review applied without history entry");
        ReviewOutcome::Overwritten { index, label }
    } else {
        store.commit(files, label.clone());
        let index = store.current_index();
        tracing::info!(label = %label, index, "review committed");
        ReviewOutcome::Committed { index, label }
    }
}

fn without_incomplete(base: &FileMap, mut candidate: FileMap, incomplete: &[String]) -> FileMap {
    for path in incomplete {
        match base.get(path) {
            Some(content) => {
                candidate.insert(path.clone(), content.clone());
            }
            None => {
                candidate.remove(path);
            }
        }
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use pw_changeset::FileDiffStatus;

    fn files(pairs: &[(&str, &str)]) -> FileMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn confirm_commits_candidate() {
        let mut store = VersionedFileStore::new(files(&[("a.ts", "one\n")]));
        let mut gate = ReviewGate::new();

        let pending = gate
            .propose(&store, "edit a", files(&[("a.ts", "two\n")]), false, vec![])
            .unwrap();
        assert_eq!(pending.diff.total_added, 1);
        assert_eq!(pending.diff.total_removed, 1);

        let outcome = gate.confirm(&mut store).unwrap();
        assert_eq!(
            outcome,
            ReviewOutcome::Committed {
                index: 1,
                label: "edit a".into()
            }
        );
        assert_eq!(store.current_files()["a.ts"], "two\n");
        assert!(!gate.has_pending());
    }

    #[test]
    fn cancel_leaves_store_untouched() {
        let mut store = VersionedFileStore::new(files(&[("a.ts", "one\n")]));
        let mut gate = ReviewGate::new();
        gate.propose(&store, "edit", files(&[("a.ts", "two\n")]), false, vec![])
            .unwrap();

        let outcome = gate.cancel().unwrap();
        assert!(matches!(outcome, ReviewOutcome::Discarded { .. }));
        assert_eq!(store.len(), 1);
        assert_eq!(store.current_files()["a.ts"], "one\n");
        assert!(matches!(
            gate.confirm(&mut store),
            Err(WorkspaceError::NoPendingReview)
        ));
    }

    #[test]
    fn skip_history_overwrites_current_entry() {
        let mut store = VersionedFileStore::new(files(&[("a.ts", "one\n")]));
        let mut gate = ReviewGate::new();
        gate.propose(&store, "restore", files(&[("a.ts", "two\n")]), true, vec![])
            .unwrap();

        let outcome = gate.confirm(&mut store).unwrap();
        assert!(matches!(outcome, ReviewOutcome::Overwritten { index: 0, .. }));
        assert_eq!(store.len(), 1);
        assert_eq!(store.current_files()["a.ts"], "two\n");
    }

    #[test]
    fn second_proposal_is_rejected_while_pending() {
        let store = VersionedFileStore::new(FileMap::new());
        let mut gate = ReviewGate::new();
        gate.propose(&store, "first", files(&[("a", "1")]), false, vec![])
            .unwrap();
        let err = gate
            .propose(&store, "second", files(&[("b", "2")]), false, vec![])
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::ReviewAlreadyPending { label } if label == "first"));
    }

    #[test]
    fn incomplete_files_never_reach_the_review() {
        let store = VersionedFileStore::new(files(&[("keep.ts", "base\n")]));
        let mut gate = ReviewGate::new();
        let candidate = files(&[("keep.ts", "partial"), ("half.ts", "par"), ("ok.ts", "ok\n")]);
        let pending = gate
            .propose(
                &store,
                "batch",
                candidate,
                false,
                vec!["keep.ts".into(), "half.ts".into()],
            )
            .unwrap();

        assert_eq!(pending.candidate_files["keep.ts"], "base\n");
        assert!(!pending.candidate_files.contains_key("half.ts"));
        assert_eq!(
            pending.diff.file("keep.ts").unwrap().status,
            FileDiffStatus::Unchanged
        );
        assert_eq!(
            pending.diff.file("ok.ts").unwrap().status,
            FileDiffStatus::Added
        );
    }

    #[test]
    fn auto_accept_commits_and_excludes_incomplete() {
        let mut store = VersionedFileStore::new(files(&[("a.ts", "one\n")]));
        let mut gate = ReviewGate::new();
        let outcome = gate
            .auto_accept(
                &mut store,
                "auto",
                files(&[("a.ts", "two\n"), ("b.ts", "cut")]),
                false,
                &["b.ts".to_string()],
            )
            .unwrap();

        assert!(matches!(outcome, ReviewOutcome::Committed { index: 1, .. }));
        assert_eq!(store.current_files()["a.ts"], "two\n");
        assert!(!store.current_files().contains_key("b.ts"));
    }
}
