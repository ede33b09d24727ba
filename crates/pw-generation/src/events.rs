// events.rs — Pipeline events and sink dispatch.
//
// The pipeline emits events as a generation progresses: characters received,
// detected file plan, per-file completion, state changes, retries, review and
// commit. Sinks (a JSONL log, the tracing subscriber, an in-memory buffer for
// UIs and tests) subscribe to them.
//
// Dispatch is synchronous. A failing sink is logged and skipped; it never
// stops the pipeline or the other sinks.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::controller::GenerationState;
use crate::error::GenerationError;

/// Events emitted while a generation runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// More of the response arrived.
    CharsReceived {
        generation_id: Uuid,
        chars_received: usize,
        timestamp: DateTime<Utc>,
    },

    /// New file headers were seen in the stream.
    FilePlanDetected {
        generation_id: Uuid,
        files: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A file block closed in the stream.
    FileCompleted {
        generation_id: Uuid,
        path: String,
        timestamp: DateTime<Utc>,
    },

    StateChanged {
        generation_id: Uuid,
        from_state: String,
        to_state: String,
        timestamp: DateTime<Utc>,
    },

    /// A truncated response recovered nothing; the same prompt is resent.
    RetryScheduled {
        generation_id: Uuid,
        attempt: u32,
        max_attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// A merged candidate is waiting for the user's decision.
    ReviewReady {
        generation_id: Uuid,
        label: String,
        files_changed: usize,
        lines_added: usize,
        lines_removed: usize,
        incomplete_files: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// Files were written to the history.
    Committed {
        label: String,
        history_index: usize,
        files: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// The next batch of a continued job is queued.
    ContinuationScheduled {
        job_id: Uuid,
        next_prompt: String,
        remaining_files: Vec<String>,
        countdown_secs: Option<u64>,
        timestamp: DateTime<Utc>,
    },

    GenerationFailed {
        generation_id: Uuid,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Get the event type name as a string.
    pub fn event_type(&self) -> &str {
        match self {
            PipelineEvent::CharsReceived { .. } => "chars_received",
            PipelineEvent::FilePlanDetected { .. } => "file_plan_detected",
            PipelineEvent::FileCompleted { .. } => "file_completed",
            PipelineEvent::StateChanged { .. } => "state_changed",
            PipelineEvent::RetryScheduled { .. } => "retry_scheduled",
            PipelineEvent::ReviewReady { .. } => "review_ready",
            PipelineEvent::Committed { .. } => "committed",
            PipelineEvent::ContinuationScheduled { .. } => "continuation_scheduled",
            PipelineEvent::GenerationFailed { .. } => "generation_failed",
        }
    }

    pub fn state_changed(generation_id: Uuid, from: &GenerationState, to: &GenerationState) -> Self {
        PipelineEvent::StateChanged {
            generation_id,
            from_state: from.to_string(),
            to_state: to.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn generation_failed(generation_id: Uuid, reason: &str) -> Self {
        PipelineEvent::GenerationFailed {
            generation_id,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Receives pipeline events.
pub trait EventSink: Send {
    /// Handle an event. Errors are logged but don't stop the pipeline.
    fn send(&self, event: &PipelineEvent) -> Result<(), GenerationError>;
}

/// Appends events as JSONL to a file.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl EventSink for JsonlSink {
    fn send(&self, event: &PipelineEvent) -> Result<(), GenerationError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| GenerationError::IoError {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| GenerationError::IoError {
                path: self.path.clone(),
                source,
            })?;

        let json = serde_json::to_string(event)?;
        writeln!(file, "{}", json).map_err(|source| GenerationError::IoError {
            path: self.path.clone(),
            source,
        })?;

        Ok(())
    }
}

/// Forwards events to `tracing` at debug level (chatty stream events) or
/// info level (everything else).
pub struct TracingSink;

impl EventSink for TracingSink {
    fn send(&self, event: &PipelineEvent) -> Result<(), GenerationError> {
        match event {
            PipelineEvent::CharsReceived { .. } | PipelineEvent::FileCompleted { .. } => {
                tracing::debug!(event = event.event_type(), "{}", serde_json::to_string(event)?);
            }
            _ => {
                tracing::info!(event = event.event_type(), "{}", serde_json::to_string(event)?);
            }
        }
        Ok(())
    }
}

/// Keeps events in memory. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything received so far.
    pub fn events(&self) -> Vec<PipelineEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|e| e.event_type().to_string())
            .collect()
    }
}

impl EventSink for MemorySink {
    fn send(&self, event: &PipelineEvent) -> Result<(), GenerationError> {
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event.clone());
        Ok(())
    }
}

/// Dispatches events to multiple sinks.
pub struct EventDispatcher {
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventDispatcher {
    /// Create a new dispatcher with no sinks.
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn dispatch(&self, event: &PipelineEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(event) {
                tracing::warn!("event sink error: {}", e);
            }
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
