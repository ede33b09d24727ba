// job.rs — Bookkeeping for a generation split across several batches.
//
// The model reports its own progress in each continuation directive. The
// job ledger does not trust it blindly: completed files only ever grow,
// remaining files never include a completed one, and the batch counter
// never runs past the batch total.

use chrono::{DateTime, Utc};
use pw_changeset::ContinuationInfo;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One multi-batch generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub job_id: Uuid,

    /// The user request that started the job.
    pub original_prompt: String,

    /// Files generated so far, in order of completion.
    pub completed_files: Vec<String>,

    pub remaining_files: Vec<String>,

    /// 1-based index of the last recorded batch.
    pub current_batch: u32,

    pub total_batches: u32,

    pub total_files_planned: u32,

    /// Prompt for the next batch, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_prompt: Option<String>,

    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BatchJob {
    pub fn new(original_prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            original_prompt: original_prompt.into(),
            completed_files: Vec::new(),
            remaining_files: Vec::new(),
            current_batch: 0,
            total_batches: 1,
            total_files_planned: 0,
            next_prompt: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// Record a finished batch.
    ///
    /// `committed` are the paths the batch actually produced; they count as
    /// completed even if the directive forgot to list them.
    pub fn record_batch(&mut self, info: Option<&ContinuationInfo>, committed: &[String]) {
        for path in committed {
            self.mark_completed(path);
        }

        match info {
            Some(info) => {
                for path in &info.completed_files {
                    self.mark_completed(path);
                }
                let completed = &self.completed_files;
                self.remaining_files = info
                    .remaining_files
                    .iter()
                    .filter(|p| !completed.contains(*p))
                    .cloned()
                    .collect();

                self.total_batches = self.total_batches.max(info.total_batches).max(1);
                let reported = info.current_batch.max(self.current_batch);
                if reported > self.total_batches {
                    tracing::warn!(
                        job = %self.job_id,
                        current_batch = reported,
                        total_batches = self.total_batches,
                        "batch counter exceeds total; clamping"
                    );
                }
                self.current_batch = reported.min(self.total_batches);

                let known = (self.completed_files.len() + self.remaining_files.len()) as u32;
                self.total_files_planned = info.total_files_planned.max(known);
                self.next_prompt = if self.remaining_files.is_empty() {
                    None
                } else {
                    Some(info.next_prompt.clone())
                };
            }
            None => {
                // No directive: the batch was final.
                self.remaining_files.clear();
                self.current_batch = (self.current_batch + 1).min(self.total_batches.max(1));
                self.total_files_planned = self
                    .total_files_planned
                    .max(self.completed_files.len() as u32);
                self.next_prompt = None;
            }
        }

        self.updated_at = Utc::now();
        tracing::info!(
            job = %self.job_id,
            batch = self.current_batch,
            total_batches = self.total_batches,
            completed = self.completed_files.len(),
            remaining = self.remaining_files.len(),
            "batch recorded"
        );
    }

    /// Fraction of planned files completed, in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        if self.total_files_planned == 0 {
            return if self.is_finished() { 1.0 } else { 0.0 };
        }
        (self.completed_files.len() as f64 / self.total_files_planned as f64).min(1.0)
    }

    pub fn is_finished(&self) -> bool {
        self.remaining_files.is_empty() && self.next_prompt.is_none()
    }

    fn mark_completed(&mut self, path: &str) {
        if !self.completed_files.iter().any(|p| p == path) {
            self.completed_files.push(path.to_string());
        }
        self.remaining_files.retain(|p| p != path);
    }
}
