//! # pw-generation
//!
//! One model request, end to end: stream accumulation, truncation recovery,
//! bounded retries and multi-batch continuation, wired to the versioned
//! store and review gate from `pw-workspace`.
//!
//! ## Key components
//!
//! - [`GenerationController`] — per-request state machine
//! - [`BatchJob`] — bookkeeping across the batches of one continued job
//! - [`GenerationRegistry`] — one active generation per context
//! - [`AutoContinue`] — cancellable countdown that fires the next batch
//! - [`GenerationSession`] — prompt delta, generation, review and commit
//! - [`EventDispatcher`] — progress events to pluggable sinks

pub mod auto_continue;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod job;
pub mod session;
pub mod token;

pub use auto_continue::{AutoContinue, ContinuationRequest, CountdownResult};
pub use config::{PipelineConfig, ProjectPaths};
pub use controller::{
    retry_prompt_for, ChunkUpdate, GenerationController, GenerationOutcome, GenerationState,
};
pub use error::GenerationError;
pub use events::{EventDispatcher, EventSink, JsonlSink, MemorySink, PipelineEvent, TracingSink};
pub use job::BatchJob;
pub use session::{GenerationReport, GenerationSession};
pub use token::{GenerationRegistry, GenerationToken};
