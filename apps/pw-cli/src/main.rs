//! # pw-cli
//!
//! Command-line interface for Patchwork.
//!
//! Applies model responses to a project kept as a versioned history under
//! `.pw/`:
//! - `pw init` — import a directory as the first history entry
//! - `pw parse` / `pw apply` — run a saved response through the pipeline
//! - `pw log` / `undo` / `redo` / `goto` / `checkpoint` — move through history
//! - `pw export` — write the current snapshot to disk

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pw_generation::ProjectPaths;
use tracing_subscriber::EnvFilter;

/// Patchwork CLI — apply generated code changes with undo and review.
#[derive(Parser)]
#[command(name = "pw", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a directory as a new project history.
    Init {
        /// Directory to import (defaults to the project root).
        dir: Option<PathBuf>,
        /// Replace an existing history.
        #[arg(long)]
        force: bool,
    },
    /// Parse a saved model response and print it as JSON.
    Parse {
        /// File holding the raw response text.
        file: PathBuf,
    },
    /// Run a saved model response through parse, merge and review.
    Apply {
        /// File holding the raw response text.
        file: PathBuf,
        /// Commit without asking (otherwise only the review is shown).
        #[arg(long)]
        yes: bool,
        /// The prompt that produced the response, used for retry prompts.
        #[arg(long, default_value = "")]
        prompt: String,
    },
    /// Show the project history.
    Log,
    /// Step back one history entry.
    Undo,
    /// Step forward one history entry.
    Redo,
    /// Jump to a history entry by index.
    Goto {
        index: usize,
    },
    /// Record a named checkpoint of the current files, or jump to one.
    Checkpoint {
        name: String,
        /// Jump to the checkpoint instead of creating it.
        #[arg(long)]
        restore: bool,
    },
    /// Write the current snapshot's files into a directory.
    Export {
        dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("pw_changeset=info".parse()?)
                .add_directive("pw_workspace=info".parse()?)
                .add_directive("pw_generation=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let paths = ProjectPaths::for_project(&project_root);

    match &cli.command {
        Commands::Init { dir, force } => commands::project::init(&paths, dir.as_deref(), *force),
        Commands::Export { dir } => commands::project::export(&paths, dir),
        Commands::Parse { file } => commands::response::parse(&paths, file),
        Commands::Apply { file, yes, prompt } => {
            commands::response::apply(&paths, file, prompt, *yes)
        }
        Commands::Log => commands::history::log(&paths),
        Commands::Undo => commands::history::undo(&paths),
        Commands::Redo => commands::history::redo(&paths),
        Commands::Goto { index } => commands::history::goto(&paths, *index),
        Commands::Checkpoint { name, restore } => {
            commands::history::checkpoint(&paths, name, *restore)
        }
    }
}
