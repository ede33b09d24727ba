// Full generation cycles through a session: streaming in chunks, retry of a
// truncated response, a two-batch job fired by the auto-continue countdown,
// and the event log on disk.

use std::time::Duration;

use pw_changeset::FileMap;
use pw_generation::{
    CountdownResult, GenerationError, GenerationSession, GenerationState, JsonlSink, MemorySink,
    PipelineConfig, ProjectPaths,
};
use pw_workspace::{HistoryFileStore, ReviewOutcome, VersionedFileStore};
use tempfile::tempdir;
use tokio::sync::mpsc;

const BATCH_ONE: &str = "Scaffolding the app in two batches.
<<<FILE create: index.html>>>
<!doctype html>
<div id=\"root\"></div>
<<<END FILE>>>
<<<FILE create: src/main.ts>>>
import { App } from './App';
App();
<<<END FILE>>>
<<<CONTINUATION>>>
{\"nextPrompt\": \"Continue with src/App.ts and src/style.css\",
 \"remainingFiles\": [\"src/App.ts\", \"src/style.css\"],
 \"currentBatch\": 1, \"totalBatches\": 2, \"totalFilesPlanned\": 4,
 \"completedFiles\": [\"index.html\", \"src/main.ts\"]}
<<<END CONTINUATION>>>
";

const BATCH_TWO: &str = "Remaining files.
<<<FILE create: src/App.ts>>>
export function App() {}
<<<END FILE>>>
<<<FILE create: src/style.css>>>
body { margin: 0; }
<<<END FILE>>>
";

const CUT_OFF: &str = "Here is the file.
<<<FILE create: src/App.ts>>>
export function App() {";

fn session(config: PipelineConfig) -> (GenerationSession, MemorySink) {
    let mut session =
        GenerationSession::new("project-1", VersionedFileStore::new(FileMap::new()), config)
            .unwrap();
    let sink = MemorySink::new();
    session.add_sink(Box::new(sink.clone()));
    (session, sink)
}

fn stream(session: &mut GenerationSession, response: &str) {
    // Uneven chunk boundaries, as a network stream would deliver them.
    let mut rest = response;
    while !rest.is_empty() {
        let mut cut = rest.len().min(17);
        while !rest.is_char_boundary(cut) {
            cut += 1;
        }
        let (chunk, tail) = rest.split_at(cut);
        session.push_chunk(chunk).unwrap();
        rest = tail;
    }
}

#[tokio::test(start_paused = true)]
async fn two_batch_job_with_auto_continue() {
    let (mut session, sink) = session(PipelineConfig::default());

    session.begin_generation("Build a tiny app").unwrap();
    stream(&mut session, BATCH_ONE);
    let report = session.complete_generation().unwrap();

    assert!(matches!(
        report.state,
        GenerationState::AwaitingContinuation { .. }
    ));
    assert!(matches!(
        report.committed,
        Some(ReviewOutcome::Committed { index: 1, .. })
    ));
    let job = session.job().unwrap();
    assert_eq!(job.current_batch, 1);
    assert_eq!(job.remaining_files, vec!["src/App.ts", "src/style.css"]);

    let (tx, mut rx) = mpsc::channel(1);
    let countdown = session.schedule_continuation(tx).unwrap();
    assert_eq!(countdown.countdown(), Duration::from_secs(10));
    assert_eq!(countdown.wait().await, CountdownResult::Fired);
    let request = rx.recv().await.unwrap();
    assert_eq!(request.context_id, "project-1");
    assert_eq!(
        request.next_prompt,
        "Continue with src/App.ts and src/style.css"
    );

    session.continue_job().unwrap();
    stream(&mut session, BATCH_TWO);
    let report = session.complete_generation().unwrap();
    assert_eq!(report.state, GenerationState::Complete);
    session.confirm_review().unwrap();

    let job = session.job().unwrap();
    assert!(job.is_finished());
    assert_eq!(job.completed_files.len(), 4);
    assert!(job.current_batch <= job.total_batches);

    let files = session.store().current_files();
    assert_eq!(files.len(), 4);
    assert_eq!(files["src/style.css"], "body { margin: 0; }\n");
    assert_eq!(session.store().len(), 3);

    let types = sink.event_types();
    for expected in [
        "file_plan_detected",
        "file_completed",
        "continuation_scheduled",
        "review_ready",
        "committed",
    ] {
        assert!(types.iter().any(|t| t == expected), "missing {expected}");
    }
}

#[tokio::test(start_paused = true)]
async fn new_request_preempts_scheduled_continuation() {
    let (mut session, _) = session(PipelineConfig::default());
    session.begin_generation("Build a tiny app").unwrap();
    stream(&mut session, BATCH_ONE);
    session.complete_generation().unwrap();

    let (tx, mut rx) = mpsc::channel(1);
    let countdown = session.schedule_continuation(tx).unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    session.begin_generation("Actually, make it blue").unwrap();
    assert_eq!(countdown.wait().await, CountdownResult::Cancelled);
    assert!(rx.recv().await.is_none());
    assert!(session.job().is_none());
}

#[test]
fn auto_continue_disabled_schedules_nothing() {
    let config = PipelineConfig {
        auto_continue: false,
        ..PipelineConfig::default()
    };
    let (mut session, _) = session(config);
    session.begin_generation("Build a tiny app").unwrap();
    stream(&mut session, BATCH_ONE);
    session.complete_generation().unwrap();

    let (tx, _rx) = mpsc::channel(1);
    assert!(session.schedule_continuation(tx).is_none());
    // Manual continuation still works.
    session.continue_job().unwrap();
}

#[test]
fn truncated_response_retries_then_recovers() {
    let (mut session, sink) = session(PipelineConfig::default());
    session.begin_generation("Write App.ts").unwrap();

    stream(&mut session, CUT_OFF);
    let report = session.complete_generation().unwrap();
    assert!(report.needs_retry());
    assert_eq!(report.retry_prompt.as_deref(), Some("Write App.ts"));
    assert_eq!(report.attempt, 2);

    stream(&mut session, BATCH_TWO);
    let report = session.complete_generation().unwrap();
    assert_eq!(report.state, GenerationState::Complete);
    assert!(report.review.is_some());
    assert!(sink.event_types().iter().any(|t| t == "retry_scheduled"));
}

#[test]
fn retry_budget_exhausted_fails_generation() {
    let config = PipelineConfig {
        max_attempts: 2,
        ..PipelineConfig::default()
    };
    let (mut session, sink) = session(config);
    session.begin_generation("Write App.ts").unwrap();

    stream(&mut session, CUT_OFF);
    assert!(session.complete_generation().unwrap().needs_retry());
    stream(&mut session, CUT_OFF);
    let report = session.complete_generation().unwrap();

    assert!(matches!(report.state, GenerationState::Failed { .. }));
    assert!(report.review.is_none());
    assert_eq!(session.store().len(), 1);
    assert_eq!(sink.event_types().last().unwrap(), "generation_failed");
}

#[test]
fn partial_recovery_reviews_complete_files_only() {
    let (mut session, _) = session(PipelineConfig::default());
    session.begin_generation("Two files").unwrap();
    stream(
        &mut session,
        "Two files.\n<<<FILE create: a.ts>>>\nexport const a = 1;\n<<<END FILE>>>\n<<<FILE create: b.ts>>>\nexport const",
    );
    let report = session.complete_generation().unwrap();

    assert!(matches!(
        &report.state,
        GenerationState::TruncatedRecovered { missing } if missing == &vec!["b.ts".to_string()]
    ));
    let review = report.review.unwrap();
    assert!(review.candidate_files.contains_key("a.ts"));
    assert!(!review.candidate_files.contains_key("b.ts"));
    assert!(report.retry_prompt.unwrap().contains("- b.ts"));
}

#[test]
fn hard_failure_is_reported_not_committed() {
    let (mut session, _) = session(PipelineConfig::default());
    session.begin_generation("Do something").unwrap();
    stream(&mut session, "I could not produce any files for this request.");
    let report = session.complete_generation().unwrap();
    assert!(matches!(report.state, GenerationState::Failed { .. }));
    assert_eq!(report.attempt, 1);

    assert!(matches!(
        session.confirm_review(),
        Err(GenerationError::Workspace(_))
    ));
}

#[test]
fn events_and_history_persist_under_project_dir() {
    let dir = tempdir().unwrap();
    let paths = ProjectPaths::for_project(dir.path());

    let config = PipelineConfig {
        auto_accept: true,
        ..PipelineConfig::default()
    };
    let (mut session, _) = session(config);
    session.add_sink(Box::new(JsonlSink::new(&paths.events_log)));

    session.begin_generation("Write App.ts").unwrap();
    stream(&mut session, BATCH_TWO);
    let report = session.complete_generation().unwrap();
    assert!(report.committed.is_some());

    HistoryFileStore::new(&paths.history)
        .save(session.store())
        .unwrap();
    let restored = HistoryFileStore::new(&paths.history).load().unwrap().unwrap();
    assert_eq!(restored.current_files(), session.store().current_files());

    let log = std::fs::read_to_string(&paths.events_log).unwrap();
    assert!(log.lines().any(|l| l.contains("\"event_type\":\"committed\"")));
}
