// response.rs — Response subcommands: parse, apply.
//
// `apply` runs one saved response through a generation session exactly as a
// streamed one would go: parse, merge, review. The diff is printed; the
// candidate is committed only with --yes.

use std::fs;
use std::path::Path;

use anyhow::Context;
use pw_changeset::{
    compute_diff, DiffReport, FileDiffStatus, LineKind, MergeIssueKind, MergeResult,
};
use pw_generation::{
    GenerationReport, GenerationSession, GenerationState, JsonlSink, ProjectPaths,
};
use pw_workspace::ReviewOutcome;

use super::{load_store, save_store};

pub fn parse(paths: &ProjectPaths, file: &Path) -> anyhow::Result<()> {
    let raw = read_response(file)?;
    let config = paths.load_config();
    let parser = pw_changeset::ResponseParser::new(&config.grammar, config.format)?;
    let parsed = parser.parse(&raw)?;
    println!("{}", serde_json::to_string_pretty(&parsed)?);
    Ok(())
}

pub fn apply(paths: &ProjectPaths, file: &Path, prompt: &str, yes: bool) -> anyhow::Result<()> {
    let raw = read_response(file)?;
    let store = load_store(paths)?;
    let base = store.current_files().clone();
    let mut config = paths.load_config();
    // One-shot command: nothing would be listening for a countdown.
    config.auto_continue = false;

    let mut session = GenerationSession::new("cli", store, config)?;
    session.add_sink(Box::new(JsonlSink::new(&paths.events_log)));

    session.begin_generation(prompt)?;
    session.push_chunk(&raw)?;
    let report = session.complete_generation()?;
    print_report(&report);

    if report.needs_retry() {
        println!(
            "The response was cut off before any file finished; regenerate it (attempt {} of {}).",
            report.attempt,
            session.config().attempts()
        );
        return Ok(());
    }
    if let GenerationState::Failed { reason } = &report.state {
        anyhow::bail!("generation failed: {}", reason);
    }

    // Batches of a continued job (and auto-accept) commit inside the
    // session; without --yes that commit stays in memory.
    if let Some(outcome) = &report.committed {
        print_diff(&compute_diff(&base, session.store().current_files()));
        if !yes {
            println!("Not committed. Re-run with --yes to commit these changes.");
            return Ok(());
        }
        print_outcome(outcome);
    }

    if session.pending_review().is_some() {
        if yes {
            print_outcome(&session.confirm_review()?);
        } else {
            session.cancel_review()?;
            println!("Not committed. Re-run with --yes to commit these changes.");
            return Ok(());
        }
    }

    save_store(paths, session.store())?;
    Ok(())
}

fn read_response(file: &Path) -> anyhow::Result<String> {
    fs::read_to_string(file).with_context(|| format!("failed to read response {}", file.display()))
}

fn print_report(report: &GenerationReport) {
    if let Some(explanation) = report.explanation.as_deref().filter(|e| !e.is_empty()) {
        println!("{}\n", explanation);
    }
    if let Some(merge) = &report.merge {
        print_merge(merge);
    }
    if let Some(review) = &report.review {
        print_diff(&review.diff);
        if !review.incomplete_files.is_empty() {
            println!("Left out (cut off): {}", review.incomplete_files.join(", "));
        }
    }
    if let Some(continuation) = &report.continuation {
        println!(
            "Batch {}/{} done; {} file(s) remaining: {}",
            continuation.current_batch,
            continuation.total_batches,
            continuation.remaining_files.len(),
            continuation.remaining_files.join(", ")
        );
        println!("Next prompt:\n{}", continuation.next_prompt);
    } else if let (GenerationState::TruncatedRecovered { .. }, Some(retry)) =
        (&report.state, &report.retry_prompt)
    {
        println!("Some files were cut off. Prompt to regenerate them:\n{}", retry);
    }
}

fn print_merge(merge: &MergeResult) {
    let stats = &merge.stats;
    println!(
        "Merge: {} created, {} updated, {} deleted, {} edit(s) applied, {} failed",
        stats.created,
        stats.updated,
        stats.deleted,
        stats.replacements_applied,
        stats.replacements_failed
    );
    for issue in &merge.errors {
        let reason = match &issue.reason {
            MergeIssueKind::SearchNotFound { search_preview } => {
                format!("search text not found: {:?}", search_preview)
            }
            MergeIssueKind::EmptySearch => "empty search block".to_string(),
            MergeIssueKind::MissingTarget => "file does not exist".to_string(),
        };
        println!("  warning: {}: {}", issue.path, reason);
    }
}

fn print_diff(diff: &DiffReport) {
    println!(
        "\n{} file(s) changed, +{} -{}",
        diff.changed_files().count(),
        diff.total_added,
        diff.total_removed
    );
    for file in diff.changed_files() {
        let status = match file.status {
            FileDiffStatus::Added => "added",
            FileDiffStatus::Removed => "removed",
            FileDiffStatus::Modified => "modified",
            FileDiffStatus::Unchanged => "unchanged",
        };
        println!("\n--- {} ({}, +{} -{})", file.path, status, file.added, file.removed);
        for line in &file.lines {
            match line.kind {
                LineKind::Added => println!("     {:>5} + {}", fmt_line(line.new_line), line.content),
                LineKind::Removed => println!("{:>5}       - {}", fmt_line(line.old_line), line.content),
                LineKind::Unchanged => {}
            }
        }
    }
    println!();
}

fn fmt_line(n: Option<usize>) -> String {
    n.map(|n| n.to_string()).unwrap_or_default()
}

fn print_outcome(outcome: &ReviewOutcome) {
    match outcome {
        ReviewOutcome::Committed { index, label } => {
            println!("Committed as entry #{}: {}", index, label)
        }
        ReviewOutcome::Overwritten { index, label } => {
            println!("Overwrote entry #{}: {}", index, label)
        }
        ReviewOutcome::Discarded { label } => println!("Discarded: {}", label),
    }
}
