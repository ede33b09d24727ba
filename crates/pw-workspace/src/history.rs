// history.rs — Versioned file store: linear undo/redo over file snapshots.
//
// The store holds an ordered sequence of immutable FileMap snapshots plus a
// cursor. Invariant: 0 <= current_index < entries.len().
//
// - commit() drops every entry after the cursor, appends, advances. There is
//   no branching history.
// - undo()/redo() only move the cursor.
// - go_to_index() jumps anywhere without discarding forward history; this is
//   how time travel to an earlier assistant message works.
// - reset() replaces everything with one fresh entry (new/blank project).
//
// The store is single-writer: callers serialize commits.

use chrono::{DateTime, Utc};
use pw_changeset::FileMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WorkspaceError;

/// Why an entry exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// First entry of a history (project creation or reset).
    Initial,
    /// A user-visible edit.
    #[default]
    Commit,
    /// A named checkpoint of the files at the time it was taken.
    Checkpoint,
}

/// One snapshot in the history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub label: String,
    #[serde(default)]
    pub kind: EntryKind,
    pub files: FileMap,
}

impl HistoryEntry {
    fn new(label: impl Into<String>, kind: EntryKind, files: FileMap) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            label: label.into(),
            kind,
            files,
        }
    }
}

/// Serializable form of the whole history, for session save/restore.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryExport {
    pub entries: Vec<HistoryEntry>,
    pub current_index: usize,
}

impl HistoryExport {
    fn validate(&self) -> Result<(), WorkspaceError> {
        if self.entries.is_empty() {
            return Err(WorkspaceError::InvalidHistory(
                "history must contain at least one entry".to_string(),
            ));
        }
        if self.current_index >= self.entries.len() {
            return Err(WorkspaceError::InvalidHistory(format!(
                "current_index {} out of range for {} entries",
                self.current_index,
                self.entries.len()
            )));
        }
        Ok(())
    }
}

/// Append-only history of named file snapshots with a movable cursor.
#[derive(Debug, Clone)]
pub struct VersionedFileStore {
    entries: Vec<HistoryEntry>,
    current_index: usize,
}

impl VersionedFileStore {
    /// Create a history whose only entry is `files`.
    pub fn new(files: FileMap) -> Self {
        Self {
            entries: vec![HistoryEntry::new("Initial", EntryKind::Initial, files)],
            current_index: 0,
        }
    }

    /// Rebuild a store from an export, validating its invariants.
    pub fn from_export(export: HistoryExport) -> Result<Self, WorkspaceError> {
        export.validate()?;
        Ok(Self {
            entries: export.entries,
            current_index: export.current_index,
        })
    }

    pub fn current(&self) -> &HistoryEntry {
        &self.entries[self.current_index]
    }

    pub fn current_files(&self) -> &FileMap {
        &self.current().files
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: a store has at least one entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn can_undo(&self) -> bool {
        self.current_index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.current_index + 1 < self.entries.len()
    }

    /// Record a new snapshot after the cursor, discarding any redo entries.
    pub fn commit(&mut self, files: FileMap, label: impl Into<String>) -> &HistoryEntry {
        self.push(HistoryEntry::new(label, EntryKind::Commit, files))
    }

    /// Record a named checkpoint of the current files.
    pub fn snapshot(&mut self, name: impl Into<String>) -> &HistoryEntry {
        let files = self.current_files().clone();
        self.push(HistoryEntry::new(name, EntryKind::Checkpoint, files))
    }

    fn push(&mut self, entry: HistoryEntry) -> &HistoryEntry {
        let discarded = self.entries.len() - (self.current_index + 1);
        if discarded > 0 {
            tracing::debug!(discarded, "dropping redo entries");
        }
        self.entries.truncate(self.current_index + 1);
        tracing::info!(label = %entry.label, kind = ?entry.kind, files = entry.files.len(), "history commit");
        self.entries.push(entry);
        self.current_index = self.entries.len() - 1;
        &self.entries[self.current_index]
    }

    /// Replace the files of the current entry without creating a new one.
    ///
    /// Used for silent, programmatic overwrites that should not be undoable.
    pub fn overwrite_current(&mut self, files: FileMap) {
        let entry = &mut self.entries[self.current_index];
        entry.files = files;
        entry.timestamp = Utc::now();
    }

    /// Move the cursor back one entry. `None` at the oldest entry.
    pub fn undo(&mut self) -> Option<&FileMap> {
        if !self.can_undo() {
            return None;
        }
        self.current_index -= 1;
        Some(self.current_files())
    }

    /// Move the cursor forward one entry. `None` at the newest entry.
    pub fn redo(&mut self) -> Option<&FileMap> {
        if !self.can_redo() {
            return None;
        }
        self.current_index += 1;
        Some(self.current_files())
    }

    /// Jump to any entry, keeping the forward history.
    pub fn go_to_index(&mut self, index: usize) -> Result<&FileMap, WorkspaceError> {
        if index >= self.entries.len() {
            return Err(WorkspaceError::IndexOutOfBounds {
                index,
                len: self.entries.len(),
            });
        }
        self.current_index = index;
        Ok(self.current_files())
    }

    /// Checkpoint entries with their indices, oldest first.
    pub fn checkpoints(&self) -> Vec<(usize, &HistoryEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind == EntryKind::Checkpoint)
            .collect()
    }

    /// Jump to the most recent checkpoint called `name`.
    pub fn go_to_checkpoint(&mut self, name: &str) -> Result<&FileMap, WorkspaceError> {
        let index = self
            .entries
            .iter()
            .rposition(|e| e.kind == EntryKind::Checkpoint && e.label == name)
            .ok_or_else(|| WorkspaceError::CheckpointNotFound(name.to_string()))?;
        self.go_to_index(index)
    }

    /// Start over with a single fresh entry.
    pub fn reset(&mut self, files: FileMap) {
        tracing::info!(files = files.len(), "history reset");
        self.entries = vec![HistoryEntry::new("Initial", EntryKind::Initial, files)];
        self.current_index = 0;
    }

    pub fn export_history(&self) -> HistoryExport {
        HistoryExport {
            entries: self.entries.clone(),
            current_index: self.current_index,
        }
    }

    /// Replace this history with an exported one. On error the store is
    /// left untouched.
    pub fn restore_history(&mut self, export: HistoryExport) -> Result<(), WorkspaceError> {
        export.validate()?;
        self.entries = export.entries;
        self.current_index = export.current_index;
        Ok(())
    }
}
