// history_store.rs — On-disk persistence for exported history.
//
// One project history per JSON file (`.pw/history.json` by default). The
// file holds a HistoryExport: every entry plus the cursor, so a session can
// be restored exactly where it left off.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::WorkspaceError;
use crate::history::{HistoryExport, VersionedFileStore};

/// JSON file-backed persistence for a [`VersionedFileStore`].
pub struct HistoryFileStore {
    path: PathBuf,
}

impl HistoryFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write the store's history, creating parent directories as needed.
    pub fn save(&self, store: &VersionedFileStore) -> Result<(), WorkspaceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| WorkspaceError::IoError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(&store.export_history())?;
        fs::write(&self.path, json).map_err(|source| WorkspaceError::IoError {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(path = %self.path.display(), entries = store.len(), "history saved");
        Ok(())
    }

    /// Load a saved history. `Ok(None)` when nothing has been saved yet.
    pub fn load(&self) -> Result<Option<VersionedFileStore>, WorkspaceError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path).map_err(|source| WorkspaceError::IoError {
            path: self.path.clone(),
            source,
        })?;
        let export: HistoryExport = serde_json::from_str(&json)?;
        VersionedFileStore::from_export(export).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pw_changeset::FileMap;
    use tempfile::tempdir;

    #[test]
    fn load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = HistoryFileStore::new(dir.path().join("history.json"));
        assert!(!store.exists());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn history_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".pw/history.json");

        let mut history = VersionedFileStore::new(FileMap::new());
        let mut files = FileMap::new();
        files.insert("index.html".to_string(), "<html></html>\n".to_string());
        history.commit(files, "scaffold");
        history.snapshot("v1");
        history.undo();

        {
            HistoryFileStore::new(&path).save(&history).unwrap();
        }

        let loaded = HistoryFileStore::new(&path).load().unwrap().unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.current_index(), 1);
        assert_eq!(loaded.checkpoints().len(), 1);
        assert_eq!(loaded.current_files()["index.html"], "<html></html>\n");
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            HistoryFileStore::new(&path).load(),
            Err(WorkspaceError::SerializationError(_))
        ));
    }
}
