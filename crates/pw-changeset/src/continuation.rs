// continuation.rs — Multi-batch continuation metadata.
//
// A model that cannot fit the whole plan into one response ends it with a
// directive describing what is left. The body is JSON (camelCase keys) so it
// survives the trip through a language model better than ad-hoc prose.

use serde::{Deserialize, Serialize};

/// Metadata describing the remaining work of a multi-batch generation job.
///
/// Invariant after [`ContinuationInfo::normalize`]: `completed_files` and
/// `remaining_files` are disjoint and free of duplicates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationInfo {
    /// The prompt to send for the next batch.
    pub next_prompt: String,

    /// Planned files not yet generated.
    #[serde(default)]
    pub remaining_files: Vec<String>,

    /// 1-based index of the batch this response belongs to.
    #[serde(default = "default_batch")]
    pub current_batch: u32,

    #[serde(default = "default_batch")]
    pub total_batches: u32,

    #[serde(default)]
    pub total_files_planned: u32,

    /// Planned files already generated, across all batches so far.
    #[serde(default)]
    pub completed_files: Vec<String>,
}

fn default_batch() -> u32 {
    1
}

impl ContinuationInfo {
    /// Restore the disjointness invariant and drop duplicate paths.
    pub fn normalize(mut self) -> Self {
        dedup_in_order(&mut self.completed_files);
        dedup_in_order(&mut self.remaining_files);
        let completed = &self.completed_files;
        self.remaining_files.retain(|p| !completed.contains(p));
        self
    }

    /// True when the job still has files to generate.
    pub fn has_remaining(&self) -> bool {
        !self.remaining_files.is_empty()
    }

    /// Every file planned for the job (completed first, then remaining).
    pub fn planned_files(&self) -> Vec<String> {
        self.completed_files
            .iter()
            .chain(self.remaining_files.iter())
            .cloned()
            .collect()
    }
}

fn dedup_in_order(paths: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    paths.retain(|p| seen.insert(p.clone()));
}
