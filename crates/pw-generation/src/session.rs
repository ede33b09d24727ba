// session.rs — One project's generation pipeline, end to end.
//
// A session owns the project history, the delta registry, the active
// generation registry and the review gate for one context. It runs:
//
//   prompt_context → begin_generation → push_chunk* → complete_generation
//     → (review: confirm_review | cancel_review) or auto-accept
//     → (continued job: schedule_continuation → continue_job ...)
//
// All mutation goes through `&mut self`, so commits are serialized.

use chrono::Utc;
use pw_changeset::{
    merge, ContinuationInfo, FileMap, MergeResult, ParsedResponse, ResponseParser,
};
use pw_workspace::{
    FileContextRegistry, FileDelta, PendingReview, ReviewGate, ReviewOutcome, VersionedFileStore,
};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auto_continue::{AutoContinue, ContinuationRequest};
use crate::config::PipelineConfig;
use crate::controller::{ChunkUpdate, GenerationController, GenerationOutcome, GenerationState};
use crate::error::GenerationError;
use crate::events::{EventDispatcher, EventSink, PipelineEvent};
use crate::job::BatchJob;
use crate::token::GenerationRegistry;

const MAX_LABEL_CHARS: usize = 72;

/// What one call to [`GenerationSession::complete_generation`] produced.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub generation_id: Uuid,
    pub state: GenerationState,
    pub attempt: u32,
    pub explanation: Option<String>,
    pub merge: Option<MergeResult>,
    /// Set when the candidate is waiting for confirm/cancel.
    pub review: Option<PendingReview>,
    /// Set when the candidate went straight to history.
    pub committed: Option<ReviewOutcome>,
    /// Prompt to resend: the same prompt for a retry, a scoped prompt after
    /// partial recovery.
    pub retry_prompt: Option<String>,
    pub continuation: Option<ContinuationInfo>,
}

impl GenerationReport {
    fn new(controller: &GenerationController) -> Self {
        Self {
            generation_id: controller.generation_id(),
            state: controller.state().clone(),
            attempt: controller.attempt(),
            explanation: None,
            merge: None,
            review: None,
            committed: None,
            retry_prompt: None,
            continuation: None,
        }
    }

    /// True when the caller should stream another response for the same
    /// generation.
    pub fn needs_retry(&self) -> bool {
        self.state == GenerationState::Streaming
    }
}

pub struct GenerationSession {
    context_id: String,
    config: PipelineConfig,
    parser: ResponseParser,
    store: VersionedFileStore,
    contexts: FileContextRegistry,
    generations: GenerationRegistry,
    review: ReviewGate,
    dispatcher: EventDispatcher,
    controller: Option<GenerationController>,
    job: Option<BatchJob>,
}

impl GenerationSession {
    pub fn new(
        context_id: impl Into<String>,
        store: VersionedFileStore,
        config: PipelineConfig,
    ) -> Result<Self, GenerationError> {
        let context_id = context_id.into();
        let parser = ResponseParser::new(&config.grammar, config.format)?;
        let mut contexts = FileContextRegistry::new();
        contexts.create(&context_id);
        Ok(Self {
            context_id,
            config,
            parser,
            store,
            contexts,
            generations: GenerationRegistry::new(),
            review: ReviewGate::new(),
            dispatcher: EventDispatcher::new(),
            controller: None,
            job: None,
        })
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.dispatcher.add_sink(sink);
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &VersionedFileStore {
        &self.store
    }

    /// Direct store access for undo/redo/time travel and manual edits.
    pub fn store_mut(&mut self) -> &mut VersionedFileStore {
        &mut self.store
    }

    pub fn into_store(self) -> VersionedFileStore {
        self.store
    }

    pub fn pending_review(&self) -> Option<&PendingReview> {
        self.review.pending()
    }

    pub fn job(&self) -> Option<&BatchJob> {
        self.job.as_ref()
    }

    pub fn state(&self) -> GenerationState {
        self.controller
            .as_ref()
            .map(|c| c.state().clone())
            .unwrap_or(GenerationState::Idle)
    }

    /// Switch to another project. Everything tied to the old context is
    /// cancelled or forgotten.
    pub fn switch_project(&mut self, context_id: impl Into<String>, store: VersionedFileStore) {
        self.cancel_generation();
        self.discard_pending_review("project switch");
        self.contexts.clear(&self.context_id);
        self.context_id = context_id.into();
        self.contexts.create(&self.context_id);
        self.store = store;
        self.job = None;
        self.controller = None;
        tracing::info!(context = %self.context_id, "switched project");
    }

    /// Which files the next prompt needs to carry.
    pub fn prompt_context(&self) -> FileDelta {
        self.contexts
            .delta(&self.context_id, self.store.current_files())
    }

    /// Record that the current files were sent to the model.
    pub fn mark_prompt_sent(&mut self) {
        self.contexts
            .mark_shared(&self.context_id, self.store.current_files());
    }

    /// Start a new user request. Any running generation, pending review,
    /// scheduled continuation or unfinished job is abandoned.
    pub fn begin_generation(&mut self, prompt: impl Into<String>) -> Result<Uuid, GenerationError> {
        if let Some(job) = self.job.take() {
            if !job.is_finished() {
                tracing::info!(job = %job.job_id, "new request abandons unfinished job");
            }
        }
        self.start(prompt.into())
    }

    /// Start the next batch of the current job.
    pub fn continue_job(&mut self) -> Result<Uuid, GenerationError> {
        let prompt = self
            .job
            .as_ref()
            .and_then(|job| job.next_prompt.clone())
            .ok_or(GenerationError::NoContinuation)?;
        self.start(prompt)
    }

    fn start(&mut self, prompt: String) -> Result<Uuid, GenerationError> {
        self.discard_pending_review("new generation");

        let token = self.generations.begin(&self.context_id);
        let mut controller = GenerationController::new(prompt, token, self.config.attempts());
        let started = controller.start();
        let id = controller.generation_id();
        self.controller = Some(controller);
        self.emit_transitions();
        started?;
        Ok(id)
    }

    /// Feed a chunk of the streamed response.
    pub fn push_chunk(&mut self, chunk: &str) -> Result<ChunkUpdate, GenerationError> {
        let controller = self
            .controller
            .as_mut()
            .ok_or(GenerationError::NoActiveGeneration)?;
        let id = controller.generation_id();
        let result = controller.push_chunk(chunk, self.parser.grammar());

        let update = match result {
            Ok(update) => update,
            Err(e) => {
                self.emit_transitions();
                if let GenerationError::Cancelled(_) = e {
                    self.dispatcher
                        .dispatch(&PipelineEvent::generation_failed(id, "cancelled"));
                }
                return Err(e);
            }
        };

        let now = Utc::now();
        self.dispatcher.dispatch(&PipelineEvent::CharsReceived {
            generation_id: id,
            chars_received: update.chars_received,
            timestamp: now,
        });
        if !update.new_files.is_empty() {
            self.dispatcher.dispatch(&PipelineEvent::FilePlanDetected {
                generation_id: id,
                files: update.new_files.clone(),
                timestamp: now,
            });
        }
        for path in &update.completed {
            self.dispatcher.dispatch(&PipelineEvent::FileCompleted {
                generation_id: id,
                path: path.clone(),
                timestamp: now,
            });
        }
        Ok(update)
    }

    /// The model signalled "done": parse, merge, then review or commit.
    pub fn complete_generation(&mut self) -> Result<GenerationReport, GenerationError> {
        let controller = self
            .controller
            .as_mut()
            .ok_or(GenerationError::NoActiveGeneration)?;
        let result = controller.finish(&self.parser);
        self.emit_transitions();
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.finish_token();
                return Err(e);
            }
        };

        let controller = self
            .controller
            .as_ref()
            .ok_or(GenerationError::NoActiveGeneration)?;
        let mut report = GenerationReport::new(controller);
        let generation_id = report.generation_id;

        match outcome {
            GenerationOutcome::Retry { attempt, prompt } => {
                self.dispatcher.dispatch(&PipelineEvent::RetryScheduled {
                    generation_id,
                    attempt,
                    max_attempts: self.config.attempts(),
                    timestamp: Utc::now(),
                });
                report.retry_prompt = Some(prompt);
                return Ok(report);
            }
            GenerationOutcome::Failed { reason } => {
                self.dispatcher
                    .dispatch(&PipelineEvent::generation_failed(generation_id, &reason));
            }
            GenerationOutcome::Complete(parsed) => {
                self.land(&mut report, &parsed, &[])?;
                self.record_final_batch(&report, &parsed, &[]);
            }
            GenerationOutcome::Recovered {
                parsed,
                missing,
                retry_prompt,
            } => {
                self.land(&mut report, &parsed, &missing)?;
                self.record_final_batch(&report, &parsed, &missing);
                report.retry_prompt = Some(retry_prompt);
            }
            GenerationOutcome::Continue {
                parsed,
                continuation,
            } => {
                self.land_batch(&mut report, &parsed, &continuation)?;
                report.continuation = Some(continuation);
            }
        }

        self.finish_token();
        Ok(report)
    }

    /// Merge and route to review, or commit directly under auto-accept.
    fn land(
        &mut self,
        report: &mut GenerationReport,
        parsed: &ParsedResponse,
        incomplete: &[String],
    ) -> Result<(), GenerationError> {
        let merged = self.merge(parsed);
        let label = label_for(parsed);
        report.explanation = Some(parsed.explanation().to_string());

        if self.config.auto_accept {
            let outcome = self.review.auto_accept(
                &mut self.store,
                label,
                merged.files.clone(),
                false,
                incomplete,
            )?;
            self.after_commit(&outcome);
            report.committed = Some(outcome);
        } else {
            let pending = self.review.propose(
                &self.store,
                label,
                merged.files.clone(),
                false,
                incomplete.to_vec(),
            )?;
            self.dispatcher.dispatch(&PipelineEvent::ReviewReady {
                generation_id: report.generation_id,
                label: pending.label.clone(),
                files_changed: pending.diff.changed_files().count(),
                lines_added: pending.diff.total_added,
                lines_removed: pending.diff.total_removed,
                incomplete_files: pending.incomplete_files.clone(),
                timestamp: Utc::now(),
            });
            report.review = Some(pending.clone());
        }

        report.merge = Some(merged);
        Ok(())
    }

    /// A batch of a continued job is committed as one step of the job.
    fn land_batch(
        &mut self,
        report: &mut GenerationReport,
        parsed: &ParsedResponse,
        continuation: &ContinuationInfo,
    ) -> Result<(), GenerationError> {
        let merged = self.merge(parsed);
        let label = format!(
            "{} (batch {}/{})",
            label_for(parsed),
            continuation.current_batch,
            continuation.total_batches
        );
        report.explanation = Some(parsed.explanation().to_string());

        let outcome = self.review.auto_accept(
            &mut self.store,
            label,
            merged.files.clone(),
            false,
            parsed.incomplete_files(),
        )?;
        self.after_commit(&outcome);
        report.committed = Some(outcome);

        let committed = landed_paths(parsed, &merged, parsed.incomplete_files());
        let prompt = self
            .controller
            .as_ref()
            .map(|c| c.prompt().to_string())
            .unwrap_or_default();
        let job = self.job.get_or_insert_with(|| BatchJob::new(prompt));
        job.record_batch(Some(continuation), &committed);

        self.dispatcher.dispatch(&PipelineEvent::ContinuationScheduled {
            job_id: job.job_id,
            next_prompt: continuation.next_prompt.clone(),
            remaining_files: job.remaining_files.clone(),
            countdown_secs: self
                .config
                .auto_continue
                .then_some(self.config.auto_continue_secs),
            timestamp: Utc::now(),
        });

        report.merge = Some(merged);
        Ok(())
    }

    fn record_final_batch(
        &mut self,
        report: &GenerationReport,
        parsed: &ParsedResponse,
        incomplete: &[String],
    ) {
        if let Some(job) = self.job.as_mut() {
            if let Some(merged) = &report.merge {
                job.record_batch(None, &landed_paths(parsed, merged, incomplete));
            }
        }
    }

    fn merge(&self, parsed: &ParsedResponse) -> MergeResult {
        let merged = merge(self.store.current_files(), parsed);
        if !merged.success {
            tracing::warn!(
                failed = ?merged.failed_paths(),
                replacements_failed = merged.stats.replacements_failed,
                "some edits did not apply"
            );
        }
        merged
    }

    /// Commit the pending review.
    pub fn confirm_review(&mut self) -> Result<ReviewOutcome, GenerationError> {
        let outcome = self.review.confirm(&mut self.store)?;
        self.after_commit(&outcome);
        Ok(outcome)
    }

    /// Discard the pending review.
    pub fn cancel_review(&mut self) -> Result<ReviewOutcome, GenerationError> {
        Ok(self.review.cancel()?)
    }

    /// Stop whatever is running for this context, including a scheduled
    /// continuation. Returns whether anything was cancelled.
    pub fn cancel_generation(&mut self) -> bool {
        let mut cancelled = self.generations.cancel(&self.context_id);
        if let Some(controller) = self.controller.as_mut() {
            if !controller.state().is_terminal() {
                controller.cancel();
                cancelled = true;
            }
        }
        self.emit_transitions();
        cancelled
    }

    /// Start the auto-continue countdown for the current job. Must be called
    /// inside a tokio runtime. `None` when auto-continue is off or the job
    /// has nothing left.
    pub fn schedule_continuation(
        &mut self,
        sender: mpsc::Sender<ContinuationRequest>,
    ) -> Option<AutoContinue> {
        if !self.config.auto_continue {
            return None;
        }
        let next_prompt = self.job.as_ref()?.next_prompt.clone()?;
        let token = self.generations.begin(&self.context_id);
        Some(AutoContinue::spawn(
            self.config.auto_continue_countdown(),
            token,
            ContinuationRequest {
                context_id: self.context_id.clone(),
                next_prompt,
            },
            sender,
        ))
    }

    /// Write files directly to history, bypassing generation. `skip_history`
    /// overwrites the current entry instead of adding one.
    pub fn apply_files(
        &mut self,
        files: FileMap,
        label: impl Into<String>,
        skip_history: bool,
    ) -> Result<ReviewOutcome, GenerationError> {
        let outcome = self
            .review
            .auto_accept(&mut self.store, label, files, skip_history, &[])?;
        self.after_commit(&outcome);
        Ok(outcome)
    }

    fn after_commit(&mut self, outcome: &ReviewOutcome) {
        let (label, index) = match outcome {
            ReviewOutcome::Committed { index, label } | ReviewOutcome::Overwritten { index, label } => {
                (label.clone(), *index)
            }
            ReviewOutcome::Discarded { .. } => return,
        };
        // The model has now seen everything it produced on top of what it
        // was sent.
        self.contexts
            .mark_shared(&self.context_id, self.store.current_files());
        self.dispatcher.dispatch(&PipelineEvent::Committed {
            label,
            history_index: index,
            files: self.store.current_files().keys().cloned().collect(),
            timestamp: Utc::now(),
        });
    }

    fn discard_pending_review(&mut self, cause: &str) {
        if !self.review.has_pending() {
            return;
        }
        match self.review.cancel() {
            Ok(ReviewOutcome::Discarded { label }) => {
                tracing::info!(label = %label, cause, "pending review discarded");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, cause, "could not discard pending review"),
        }
    }

    fn emit_transitions(&mut self) {
        if let Some(controller) = self.controller.as_mut() {
            let id = controller.generation_id();
            for (from, to) in controller.drain_transitions() {
                self.dispatcher
                    .dispatch(&PipelineEvent::state_changed(id, &from, &to));
            }
        }
    }

    fn finish_token(&mut self) {
        if let Some(controller) = &self.controller {
            self.generations
                .finish(&self.context_id, controller.token());
        }
    }
}

impl std::fmt::Debug for GenerationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationSession")
            .field("context_id", &self.context_id)
            .field("history_len", &self.store.len())
            .field("state", &self.state())
            .finish()
    }
}

/// Paths the merge actually wrote, excluding failed edits and cut-off files.
fn landed_paths(parsed: &ParsedResponse, merged: &MergeResult, incomplete: &[String]) -> Vec<String> {
    let failed = merged.failed_paths();
    parsed
        .touched_paths()
        .into_iter()
        .filter(|p| !failed.contains(&p.as_str()) && !incomplete.contains(p))
        .collect()
}

/// First non-empty line of the explanation, shortened for the history list.
fn label_for(parsed: &ParsedResponse) -> String {
    let first = parsed
        .explanation()
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("Generated changes");
    if first.chars().count() > MAX_LABEL_CHARS {
        let short: String = first.chars().take(MAX_LABEL_CHARS).collect();
        format!("{short}…")
    } else {
        first.to_string()
    }
}
