// controller.rs — Per-request generation state machine.
//
// One controller drives one generation request:
//   Idle → Streaming → Parsing → Complete
//                              → TruncatedRecovered (some files cut off)
//                              → AwaitingContinuation (more batches planned)
//                              → Failed
//   Parsing → Streaming when a truncated response recovered nothing and the
//   retry budget allows another attempt with the same prompt.
//   Any state → Failed (cancellation, hard parse failure).
//
// The controller never touches the store. It hands the parsed response back
// to the session, which merges and routes it to review.

use std::fmt;

use pw_changeset::{
    CompiledGrammar, ContinuationInfo, FileStreamStatus, ParsedResponse, ProgressScanner,
    ResponseParser,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GenerationError;
use crate::token::GenerationToken;

/// The lifecycle state of one generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GenerationState {
    Idle,

    /// Chunks are arriving.
    Streaming,

    /// The complete buffer is being parsed.
    Parsing,

    /// Every block closed and no further batch is planned.
    Complete,

    /// Some blocks were cut off; the closed ones were recovered.
    TruncatedRecovered { missing: Vec<String> },

    /// The response announced another batch.
    AwaitingContinuation {
        next_prompt: String,
        remaining_files: Vec<String>,
    },

    Failed { reason: String },
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationState::Idle => write!(f, "idle"),
            GenerationState::Streaming => write!(f, "streaming"),
            GenerationState::Parsing => write!(f, "parsing"),
            GenerationState::Complete => write!(f, "complete"),
            GenerationState::TruncatedRecovered { .. } => write!(f, "truncated_recovered"),
            GenerationState::AwaitingContinuation { .. } => write!(f, "awaiting_continuation"),
            GenerationState::Failed { .. } => write!(f, "failed"),
        }
    }
}

impl GenerationState {
    /// Check whether transitioning from this state to `next` is valid.
    pub fn can_transition_to(&self, next: &GenerationState) -> bool {
        if matches!(next, GenerationState::Failed { .. }) {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (GenerationState::Idle, GenerationState::Streaming)
                | (GenerationState::Streaming, GenerationState::Parsing)
                | (GenerationState::Parsing, GenerationState::Complete)
                | (GenerationState::Parsing, GenerationState::TruncatedRecovered { .. })
                | (GenerationState::Parsing, GenerationState::AwaitingContinuation { .. })
                // Retry of a truncated response that recovered nothing.
                | (GenerationState::Parsing, GenerationState::Streaming)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GenerationState::Complete
                | GenerationState::TruncatedRecovered { .. }
                | GenerationState::AwaitingContinuation { .. }
                | GenerationState::Failed { .. }
        )
    }
}

/// What [`GenerationController::finish`] decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Complete(ParsedResponse),

    /// Partial recovery. `retry_prompt` asks for the missing files only.
    Recovered {
        parsed: ParsedResponse,
        missing: Vec<String>,
        retry_prompt: String,
    },

    /// A batch of a multi-batch job. Files the batch failed to finish are
    /// folded into `continuation.remaining_files`.
    Continue {
        parsed: ParsedResponse,
        continuation: ContinuationInfo,
    },

    /// Resend `prompt` unchanged and stream the new response.
    Retry { attempt: u32, prompt: String },

    Failed { reason: String },
}

/// Stream progress since the previous chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkUpdate {
    pub chars_received: usize,
    /// File headers seen for the first time.
    pub new_files: Vec<String>,
    /// Files whose closing line just arrived.
    pub completed: Vec<String>,
}

/// Drives one generation request.
#[derive(Debug)]
pub struct GenerationController {
    prompt: String,
    state: GenerationState,
    attempt: u32,
    max_attempts: u32,
    buffer: String,
    chars_received: usize,
    token: GenerationToken,
    scanner: ProgressScanner,
    files: Vec<(String, FileStreamStatus)>,
    transitions: Vec<(GenerationState, GenerationState)>,
}

impl GenerationController {
    pub fn new(prompt: impl Into<String>, token: GenerationToken, max_attempts: u32) -> Self {
        Self {
            prompt: prompt.into(),
            state: GenerationState::Idle,
            attempt: 0,
            max_attempts: max_attempts.max(1),
            buffer: String::new(),
            chars_received: 0,
            token,
            scanner: ProgressScanner::new(),
            files: Vec::new(),
            transitions: Vec::new(),
        }
    }

    /// The generation id is the id of its cancellation token.
    pub fn generation_id(&self) -> Uuid {
        self.token.id()
    }

    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// 1-based attempt number; 0 before [`Self::start`].
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn token(&self) -> &GenerationToken {
        &self.token
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Begin streaming the first attempt.
    pub fn start(&mut self) -> Result<(), GenerationError> {
        self.check_cancelled()?;
        self.transition(GenerationState::Streaming)?;
        self.attempt = 1;
        tracing::info!(generation = %self.generation_id(), "generation started");
        Ok(())
    }

    /// Append a chunk of the response.
    pub fn push_chunk(
        &mut self,
        chunk: &str,
        grammar: &CompiledGrammar,
    ) -> Result<ChunkUpdate, GenerationError> {
        self.check_cancelled()?;
        if self.state != GenerationState::Streaming {
            return Err(self.invalid("streaming"));
        }

        self.buffer.push_str(chunk);
        self.chars_received += chunk.chars().count();
        let mut update = ChunkUpdate {
            chars_received: self.chars_received,
            ..ChunkUpdate::default()
        };

        // Headers and closing lines are whole lines; nothing new to find
        // until a line ends.
        if !chunk.contains('\n') {
            return Ok(update);
        }

        for file in self.scanner.feed(&self.buffer, grammar) {
            match self.files.iter_mut().find(|(path, _)| *path == file.path) {
                Some((_, status)) => {
                    if *status != file.status && file.status == FileStreamStatus::Complete {
                        update.completed.push(file.path.clone());
                    }
                    *status = file.status;
                }
                None => {
                    update.new_files.push(file.path.clone());
                    if file.status == FileStreamStatus::Complete {
                        update.completed.push(file.path.clone());
                    }
                    self.files.push((file.path, file.status));
                }
            }
        }
        Ok(update)
    }

    /// Parse the accumulated buffer and decide the outcome.
    pub fn finish(&mut self, parser: &ResponseParser) -> Result<GenerationOutcome, GenerationError> {
        self.check_cancelled()?;
        self.transition(GenerationState::Parsing)?;
        let raw = std::mem::take(&mut self.buffer);

        let parsed = match parser.parse(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                let reason = e.to_string();
                self.fail(&reason)?;
                return Ok(GenerationOutcome::Failed { reason });
            }
        };

        if parsed.truncated() && !parsed.has_usable_files() {
            return self.retry_or_fail();
        }

        if let Some(info) = parsed.continuation().filter(|c| c.has_remaining()) {
            let mut continuation = info.clone();
            continuation
                .remaining_files
                .extend(parsed.incomplete_files().iter().cloned());
            let continuation = continuation.normalize();
            self.transition(GenerationState::AwaitingContinuation {
                next_prompt: continuation.next_prompt.clone(),
                remaining_files: continuation.remaining_files.clone(),
            })?;
            return Ok(GenerationOutcome::Continue {
                parsed,
                continuation,
            });
        }

        if parsed.truncated() {
            let missing = parsed.incomplete_files().to_vec();
            self.transition(GenerationState::TruncatedRecovered {
                missing: missing.clone(),
            })?;
            let retry_prompt = retry_prompt_for(&self.prompt, &missing);
            return Ok(GenerationOutcome::Recovered {
                parsed,
                missing,
                retry_prompt,
            });
        }

        self.transition(GenerationState::Complete)?;
        Ok(GenerationOutcome::Complete(parsed))
    }

    /// Stop the generation. No-op once a terminal state is reached.
    pub fn cancel(&mut self) {
        self.token.cancel();
        if !self.state.is_terminal() {
            let from = std::mem::replace(
                &mut self.state,
                GenerationState::Failed {
                    reason: "cancelled".to_string(),
                },
            );
            self.transitions.push((from, self.state.clone()));
        }
    }

    /// State changes since the last call, oldest first.
    pub fn drain_transitions(&mut self) -> Vec<(GenerationState, GenerationState)> {
        std::mem::take(&mut self.transitions)
    }

    fn retry_or_fail(&mut self) -> Result<GenerationOutcome, GenerationError> {
        if self.attempt < self.max_attempts {
            self.transition(GenerationState::Streaming)?;
            self.attempt += 1;
            self.files.clear();
            self.scanner = ProgressScanner::new();
            self.chars_received = 0;
            tracing::info!(
                generation = %self.generation_id(),
                attempt = self.attempt,
                max_attempts = self.max_attempts,
                "truncated response recovered nothing; retrying"
            );
            return Ok(GenerationOutcome::Retry {
                attempt: self.attempt,
                prompt: self.prompt.clone(),
            });
        }

        let reason = format!(
            "response truncated with no complete files after {} attempt(s)",
            self.attempt
        );
        self.fail(&reason)?;
        Ok(GenerationOutcome::Failed { reason })
    }

    fn fail(&mut self, reason: &str) -> Result<(), GenerationError> {
        tracing::warn!(generation = %self.generation_id(), reason, "generation failed");
        self.transition(GenerationState::Failed {
            reason: reason.to_string(),
        })
    }

    /// Cancellation is observed here, at every entry point.
    fn check_cancelled(&mut self) -> Result<(), GenerationError> {
        if self.token.is_cancelled() {
            self.cancel();
            return Err(GenerationError::Cancelled(self.generation_id()));
        }
        Ok(())
    }

    fn transition(&mut self, next: GenerationState) -> Result<(), GenerationError> {
        if !self.state.can_transition_to(&next) {
            return Err(GenerationError::InvalidTransition {
                generation_id: self.generation_id(),
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        let from = std::mem::replace(&mut self.state, next);
        tracing::debug!(
            generation = %self.generation_id(),
            from = %from,
            to = %self.state,
            "generation state changed"
        );
        self.transitions.push((from, self.state.clone()));
        Ok(())
    }

    fn invalid(&self, to: &str) -> GenerationError {
        GenerationError::InvalidTransition {
            generation_id: self.generation_id(),
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }
}

/// Prompt that asks again for only the files a truncated response lost.
pub fn retry_prompt_for(original_prompt: &str, incomplete: &[String]) -> String {
    let mut prompt = String::from(original_prompt.trim_end());
    prompt.push_str(
        "\n\nThe previous response was cut off before these files were finished:\n",
    );
    for path in incomplete {
        prompt.push_str("- ");
        prompt.push_str(path);
        prompt.push('\n');
    }
    prompt.push_str(
        "\nGenerate only these files, each complete from start to end. \
         Do not repeat files that were already delivered.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPLETE: &str = "Adds a button.\n\
<<<FILE create: src/Button.tsx>>>\n\
export const Button = () => null;\n\
<<<END FILE>>>\n";

    const PARTIAL: &str = "Two files.\n\
<<<FILE create: src/a.ts>>>\n\
export const a = 1;\n\
<<<END FILE>>>\n\
<<<FILE create: src/b.ts>>>\n\
export const b =";

    const NOTHING_RECOVERED: &str = "Starting.\n\
<<<FILE create: src/a.ts>>>\n\
export const a =";

    const CONTINUED: &str = "Batch one.\n\
<<<FILE create: src/a.ts>>>\n\
a\n\
<<<END FILE>>>\n\
<<<CONTINUATION>>>\n\
{\"nextPrompt\": \"Continue with src/b.ts\", \"remainingFiles\": [\"src/b.ts\"], \
\"currentBatch\": 1, \"totalBatches\": 2, \"totalFilesPlanned\": 2, \"completedFiles\": [\"src/a.ts\"]}\n\
<<<END CONTINUATION>>>\n";

    fn controller(max_attempts: u32) -> (GenerationController, ResponseParser) {
        let mut c = GenerationController::new("build it", GenerationToken::new(), max_attempts);
        c.start().unwrap();
        (c, ResponseParser::v1().unwrap())
    }

    fn run(c: &mut GenerationController, parser: &ResponseParser, text: &str) -> GenerationOutcome {
        c.push_chunk(text, parser.grammar()).unwrap();
        c.finish(parser).unwrap()
    }

    #[test]
    fn transition_graph() {
        use GenerationState::*;
        assert!(Idle.can_transition_to(&Streaming));
        assert!(Streaming.can_transition_to(&Parsing));
        assert!(Parsing.can_transition_to(&Complete));
        assert!(Parsing.can_transition_to(&Streaming));
        assert!(!Idle.can_transition_to(&Parsing));
        assert!(!Complete.can_transition_to(&Streaming));
        assert!(Streaming.can_transition_to(&Failed { reason: "x".into() }));
        assert!(!Complete.can_transition_to(&Failed { reason: "x".into() }));
    }

    #[test]
    fn complete_response() {
        let (mut c, parser) = controller(3);
        let outcome = run(&mut c, &parser, COMPLETE);
        assert!(matches!(outcome, GenerationOutcome::Complete(_)));
        assert_eq!(c.state(), &GenerationState::Complete);

        let states: Vec<String> = c
            .drain_transitions()
            .into_iter()
            .map(|(_, to)| to.to_string())
            .collect();
        assert_eq!(states, vec!["streaming", "parsing", "complete"]);
    }

    #[test]
    fn partial_recovery_offers_scoped_retry() {
        let (mut c, parser) = controller(3);
        match run(&mut c, &parser, PARTIAL) {
            GenerationOutcome::Recovered {
                parsed,
                missing,
                retry_prompt,
            } => {
                assert!(parsed.has_usable_files());
                assert_eq!(missing, vec!["src/b.ts"]);
                assert!(retry_prompt.starts_with("build it"));
                assert!(retry_prompt.contains("- src/b.ts"));
                assert!(!retry_prompt.contains("- src/a.ts"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(matches!(
            c.state(),
            GenerationState::TruncatedRecovered { missing } if missing == &vec!["src/b.ts".to_string()]
        ));
    }

    #[test]
    fn nothing_recovered_retries_with_same_prompt_then_fails() {
        let (mut c, parser) = controller(3);

        for expected_attempt in 2..=3 {
            match run(&mut c, &parser, NOTHING_RECOVERED) {
                GenerationOutcome::Retry { attempt, prompt } => {
                    assert_eq!(attempt, expected_attempt);
                    assert_eq!(prompt, "build it");
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
            assert_eq!(c.state(), &GenerationState::Streaming);
            assert!(c.buffer().is_empty());
        }

        let outcome = run(&mut c, &parser, NOTHING_RECOVERED);
        assert!(matches!(outcome, GenerationOutcome::Failed { .. }));
        assert!(matches!(c.state(), GenerationState::Failed { .. }));
        assert_eq!(c.attempt(), 3);
    }

    #[test]
    fn retry_succeeds_on_second_attempt() {
        let (mut c, parser) = controller(3);
        assert!(matches!(
            run(&mut c, &parser, NOTHING_RECOVERED),
            GenerationOutcome::Retry { .. }
        ));
        assert!(matches!(
            run(&mut c, &parser, COMPLETE),
            GenerationOutcome::Complete(_)
        ));
    }

    #[test]
    fn hard_parse_failure_fails_without_retry() {
        let (mut c, parser) = controller(3);
        let outcome = run(&mut c, &parser, "Sorry, I can't help with that.");
        assert!(matches!(outcome, GenerationOutcome::Failed { .. }));
        assert_eq!(c.attempt(), 1);
    }

    #[test]
    fn continuation_awaits_next_batch() {
        let (mut c, parser) = controller(3);
        match run(&mut c, &parser, CONTINUED) {
            GenerationOutcome::Continue { continuation, .. } => {
                assert_eq!(continuation.remaining_files, vec!["src/b.ts"]);
                assert_eq!(continuation.next_prompt, "Continue with src/b.ts");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(matches!(
            c.state(),
            GenerationState::AwaitingContinuation { .. }
        ));
    }

    #[test]
    fn chunk_updates_report_plan_and_completion() {
        let mut c = GenerationController::new("p", GenerationToken::new(), 3);
        let parser = ResponseParser::v1().unwrap();
        c.start().unwrap();

        let first = c
            .push_chunk("Intro\n<<<FILE create: src/a.ts>>>\nline\n", parser.grammar())
            .unwrap();
        assert_eq!(first.new_files, vec!["src/a.ts"]);
        assert!(first.completed.is_empty());

        let partial = c.push_chunk("more", parser.grammar()).unwrap();
        assert!(partial.new_files.is_empty());
        assert_eq!(partial.chars_received, first.chars_received + 4);

        let second = c.push_chunk("\n<<<END FILE>>>\n", parser.grammar()).unwrap();
        assert_eq!(second.completed, vec!["src/a.ts"]);
    }

    #[test]
    fn header_split_across_chunks_is_reported_once() {
        let mut c = GenerationController::new("p", GenerationToken::new(), 3);
        let parser = ResponseParser::v1().unwrap();
        c.start().unwrap();

        let first = c
            .push_chunk("<<<FILE create: a.ts>>>\nA\n<<<FILE create: src/b", parser.grammar())
            .unwrap();
        assert_eq!(first.new_files, vec!["a.ts"]);

        let second = c.push_chunk(".ts>>>\nB\n", parser.grammar()).unwrap();
        assert_eq!(second.new_files, vec!["src/b.ts"]);
        assert_eq!(second.completed, vec!["a.ts"]);

        // Lines already scanned produce nothing further.
        let third = c.push_chunk("B2\n", parser.grammar()).unwrap();
        assert!(third.new_files.is_empty());
        assert!(third.completed.is_empty());
    }

    #[test]
    fn cancelled_token_stops_streaming() {
        let token = GenerationToken::new();
        let mut c = GenerationController::new("p", token.clone(), 3);
        let parser = ResponseParser::v1().unwrap();
        c.start().unwrap();
        token.cancel();

        let err = c.push_chunk("text\n", parser.grammar()).unwrap_err();
        assert!(matches!(err, GenerationError::Cancelled(id) if id == token.id()));
        assert!(matches!(c.state(), GenerationState::Failed { reason } if reason == "cancelled"));
    }

    #[test]
    fn push_before_start_is_rejected() {
        let mut c = GenerationController::new("p", GenerationToken::new(), 3);
        let parser = ResponseParser::v1().unwrap();
        assert!(matches!(
            c.push_chunk("x", parser.grammar()),
            Err(GenerationError::InvalidTransition { .. })
        ));
    }
}
