// context.rs — File context delta tracking.
//
// Per conversation context, remember a fingerprint of every file the model
// was last shown. The next prompt only needs the files that are new or
// changed since then, plus the names of deleted ones.
//
// The registry is an explicit object with a create/clear lifecycle, owned by
// the session. Fingerprints never stand in for project content.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pw_changeset::FileMap;
use serde::{Deserialize, Serialize};

use crate::hasher::hash_str;

/// Length plus SHA-256 of a file's content at the time it was shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    pub len: usize,
    pub sha256: String,
    pub shared_at: DateTime<Utc>,
}

impl FileFingerprint {
    pub fn of(content: &str) -> Self {
        Self {
            len: content.len(),
            sha256: hash_str(content),
            shared_at: Utc::now(),
        }
    }

    /// Length is checked first so most changed files skip hashing.
    pub fn matches(&self, content: &str) -> bool {
        self.len == content.len() && self.sha256 == hash_str(content)
    }
}

/// What one context last shared with the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileContextState {
    pub files: HashMap<String, FileFingerprint>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Classification of current files against the last shared set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDelta {
    pub new: Vec<String>,
    pub changed: Vec<String>,
    pub unchanged: Vec<String>,
    pub deleted: Vec<String>,
}

impl FileDelta {
    /// True when nothing needs to be re-sent.
    pub fn is_unchanged(&self) -> bool {
        self.new.is_empty() && self.changed.is_empty() && self.deleted.is_empty()
    }

    /// Contents of the new and changed files, to include in the next prompt.
    pub fn files_to_send(&self, current: &FileMap) -> FileMap {
        self.new
            .iter()
            .chain(self.changed.iter())
            .filter_map(|path| current.get(path).map(|c| (path.clone(), c.clone())))
            .collect()
    }
}

/// Per-context fingerprint sets, keyed by context id.
#[derive(Debug, Default)]
pub struct FileContextRegistry {
    contexts: HashMap<String, FileContextState>,
}

impl FileContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a context with an empty shared set. No-op if it exists.
    pub fn create(&mut self, context_id: &str) {
        self.contexts
            .entry(context_id.to_string())
            .or_default();
    }

    /// Forget everything shared in a context. Returns whether it existed.
    pub fn clear(&mut self, context_id: &str) -> bool {
        let existed = self.contexts.remove(context_id).is_some();
        if existed {
            tracing::debug!(context = context_id, "file context cleared");
        }
        existed
    }

    pub fn contains(&self, context_id: &str) -> bool {
        self.contexts.contains_key(context_id)
    }

    pub fn state(&self, context_id: &str) -> Option<&FileContextState> {
        self.contexts.get(context_id)
    }

    /// Classify `current` against what `context_id` last shared.
    ///
    /// An unknown context has shared nothing, so every file is new.
    pub fn delta(&self, context_id: &str, current: &FileMap) -> FileDelta {
        let mut delta = FileDelta::default();
        let shared = self.contexts.get(context_id).map(|s| &s.files);

        for (path, content) in current {
            match shared.and_then(|files| files.get(path)) {
                None => delta.new.push(path.clone()),
                Some(fp) if fp.matches(content) => delta.unchanged.push(path.clone()),
                Some(_) => delta.changed.push(path.clone()),
            }
        }
        if let Some(files) = shared {
            delta.deleted = files
                .keys()
                .filter(|path| !current.contains_key(*path))
                .cloned()
                .collect();
            delta.deleted.sort();
        }

        tracing::debug!(
            context = context_id,
            new = delta.new.len(),
            changed = delta.changed.len(),
            unchanged = delta.unchanged.len(),
            deleted = delta.deleted.len(),
            "file context delta"
        );
        delta
    }

    /// Record that `files` is now exactly what the model has seen.
    pub fn mark_shared(&mut self, context_id: &str, files: &FileMap) {
        let state = self.contexts.entry(context_id.to_string()).or_default();
        state.files = files
            .iter()
            .map(|(path, content)| (path.clone(), FileFingerprint::of(content)))
            .collect();
        state.updated_at = Some(Utc::now());
    }
}
