pub mod history;
pub mod project;
pub mod response;

use anyhow::Context;
use pw_generation::ProjectPaths;
use pw_workspace::{HistoryFileStore, VersionedFileStore};

/// Load the project history, failing with a hint when there is none.
pub fn load_store(paths: &ProjectPaths) -> anyhow::Result<VersionedFileStore> {
    HistoryFileStore::new(&paths.history)
        .load()
        .with_context(|| format!("failed to read history at {}", paths.history.display()))?
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no history at {}; run `pw init` first",
                paths.history.display()
            )
        })
}

pub fn save_store(paths: &ProjectPaths, store: &VersionedFileStore) -> anyhow::Result<()> {
    HistoryFileStore::new(&paths.history)
        .save(store)
        .with_context(|| format!("failed to write history at {}", paths.history.display()))
}
