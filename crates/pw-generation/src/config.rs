// config.rs — Pipeline configuration and project-local paths.
//
// Settings live in `.pw/pipeline.toml`. Every field has a default, so a
// missing file or an empty table behaves like a stock install.

use std::path::{Path, PathBuf};
use std::time::Duration;

use pw_changeset::{ResponseFormat, WireGrammar};
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// Top-level pipeline configuration from .pw/pipeline.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Attempts per request when a truncated response recovers nothing.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fire the next batch of a continued job automatically.
    #[serde(default = "default_auto_continue")]
    pub auto_continue: bool,

    /// Countdown before an automatic continuation fires.
    #[serde(default = "default_auto_continue_secs")]
    pub auto_continue_secs: u64,

    /// Commit merged results without holding them for review.
    #[serde(default)]
    pub auto_accept: bool,

    /// Expected response format: "auto", "marker" or "search_replace".
    #[serde(default)]
    pub format: ResponseFormat,

    /// Block delimiters; unset fields keep the v1 defaults.
    #[serde(default)]
    pub grammar: WireGrammar,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            auto_continue: default_auto_continue(),
            auto_continue_secs: default_auto_continue_secs(),
            auto_accept: false,
            format: ResponseFormat::default(),
            grammar: WireGrammar::default(),
        }
    }
}

// Serde default functions
fn default_max_attempts() -> u32 {
    3
}

fn default_auto_continue() -> bool {
    true
}

fn default_auto_continue_secs() -> u64 {
    10
}

impl PipelineConfig {
    /// Load pipeline config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, GenerationError> {
        let content = std::fs::read_to_string(path).map_err(|source| GenerationError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| GenerationError::ConfigError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Try to load config, returning default if the file doesn't exist.
    /// An unreadable or invalid file is logged and also falls back.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("using default pipeline config: {}", e);
            Self::default()
        })
    }

    pub fn auto_continue_countdown(&self) -> Duration {
        Duration::from_secs(self.auto_continue_secs)
    }

    /// Never less than one attempt.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Files Patchwork keeps under `<project>/.pw/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPaths {
    pub project_root: PathBuf,
    pub pw_dir: PathBuf,
    /// Exported history (see `HistoryFileStore`).
    pub history: PathBuf,
    /// Append-only pipeline event log.
    pub events_log: PathBuf,
    pub config: PathBuf,
}

impl ProjectPaths {
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        let root = project_root.as_ref().to_path_buf();
        let pw_dir = root.join(".pw");
        Self {
            project_root: root,
            history: pw_dir.join("history.json"),
            events_log: pw_dir.join("events.jsonl"),
            config: pw_dir.join("pipeline.toml"),
            pw_dir,
        }
    }

    pub fn load_config(&self) -> PipelineConfig {
        PipelineConfig::load_or_default(&self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert!(config.auto_continue);
        assert_eq!(config.auto_continue_countdown(), Duration::from_secs(10));
        assert!(!config.auto_accept);
        assert_eq!(config.format, ResponseFormat::Auto);
        assert_eq!(config.grammar.version, 1);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: PipelineConfig = toml::from_str("").unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.auto_continue_secs, 10);
    }

    #[test]
    fn partial_grammar_override_keeps_other_markers() {
        let toml_str = r#"
max_attempts = 5
auto_accept = true
format = "search_replace"

[grammar.marker]
file_close = '^</file>$'
"#;
        let config: PipelineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_attempts, 5);
        assert!(config.auto_accept);
        assert_eq!(config.format, ResponseFormat::SearchReplace);
        assert_eq!(config.grammar.marker.file_close, "^</file>$");
        assert_eq!(
            config.grammar.marker.file_open,
            WireGrammar::v1().marker.file_open
        );
        assert!(config.grammar.compile().is_ok());
    }

    #[test]
    fn load_or_default_when_missing() {
        let dir = tempdir().unwrap();
        let config = PipelineConfig::load_or_default(&dir.path().join("nope.toml"));
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn load_reports_invalid_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "max_attempts = \"many\"").unwrap();
        assert!(matches!(
            PipelineConfig::load(&path),
            Err(GenerationError::ConfigError { .. })
        ));
        assert_eq!(PipelineConfig::load_or_default(&path).max_attempts, 3);
    }

    #[test]
    fn project_paths_live_under_pw_dir() {
        let paths = ProjectPaths::for_project("/work/site");
        assert_eq!(paths.history, PathBuf::from("/work/site/.pw/history.json"));
        assert_eq!(paths.events_log, PathBuf::from("/work/site/.pw/events.jsonl"));
        assert_eq!(paths.config, PathBuf::from("/work/site/.pw/pipeline.toml"));
    }
}
