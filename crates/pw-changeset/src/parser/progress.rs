// progress.rs — Partial-plan detection while a response is still streaming.
//
// The UI wants to show which files the model is writing before the response
// is done. This scan only reads headers and closing lines; it never builds a
// change-set and never touches committed state.

use serde::{Deserialize, Serialize};

use crate::grammar::CompiledGrammar;

use super::normalize_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStreamStatus {
    /// Header seen, closing line not yet.
    Streaming,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProgress {
    pub path: String,
    pub status: FileStreamStatus,
}

/// Snapshot of a partially received response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamProgress {
    pub chars_received: usize,
    /// Files in order of first appearance.
    pub files: Vec<FileProgress>,
}

impl StreamProgress {
    pub fn completed(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .filter(|f| f.status == FileStreamStatus::Complete)
            .map(|f| f.path.as_str())
    }

    /// The file currently being written, if any.
    pub fn streaming(&self) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.status == FileStreamStatus::Streaming)
            .map(|f| f.path.as_str())
    }

    fn status_of(&self, path: &str) -> Option<FileStreamStatus> {
        self.files.iter().find(|f| f.path == path).map(|f| f.status)
    }
}

/// Incremental scanner for a growing buffer.
///
/// Each [`feed`](ProgressScanner::feed) reads only the lines completed since
/// the previous call, so tracking a long stream stays linear in its length.
#[derive(Debug, Clone, Default)]
pub struct ProgressScanner {
    progress: StreamProgress,
    open: Option<String>,
    offset: usize,
}

impl ProgressScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files seen so far. `chars_received` covers complete lines only.
    pub fn progress(&self) -> &StreamProgress {
        &self.progress
    }

    /// Scan the lines of `buffer` completed since the last call and return
    /// the files whose status was set by them. `buffer` must extend the
    /// buffer passed previously; a trailing partial line waits for its
    /// newline.
    pub fn feed(&mut self, buffer: &str, grammar: &CompiledGrammar) -> Vec<FileProgress> {
        let Some(rest) = buffer.get(self.offset..) else {
            return Vec::new();
        };
        let Some(end) = rest.rfind('\n') else {
            return Vec::new();
        };
        let complete = &rest[..=end];
        self.offset += end + 1;
        self.progress.chars_received += complete.chars().count();

        let mut touched = Vec::new();
        for line in complete.lines() {
            self.scan_line(line, grammar, &mut touched);
        }
        touched
            .into_iter()
            .filter_map(|path| {
                let status = self.progress.status_of(&path)?;
                Some(FileProgress { path, status })
            })
            .collect()
    }

    fn set(&mut self, path: String, status: FileStreamStatus, touched: &mut Vec<String>) {
        if !touched.contains(&path) {
            touched.push(path.clone());
        }
        match self.progress.files.iter_mut().find(|f| f.path == path) {
            Some(existing) => existing.status = status,
            None => self.progress.files.push(FileProgress { path, status }),
        }
    }

    fn scan_line(&mut self, line: &str, grammar: &CompiledGrammar, touched: &mut Vec<String>) {
        let trimmed = line.trim();
        if self.open.is_some()
            && (grammar.file_close.is_match(trimmed)
                || grammar.edit_close.is_match(trimmed)
                || grammar.new_close.is_match(trimmed))
        {
            if let Some(path) = self.open.take() {
                self.set(path, FileStreamStatus::Complete, touched);
            }
            return;
        }

        if let Some(caps) = grammar.file_open.captures(trimmed) {
            if let Some(prev) = self.open.take() {
                self.set(prev, FileStreamStatus::Complete, touched);
            }
            if let Some(path) = normalize_path(&caps["path"]) {
                if &caps["action"] == "delete" {
                    self.set(path, FileStreamStatus::Complete, touched);
                } else {
                    self.set(path.clone(), FileStreamStatus::Streaming, touched);
                    self.open = Some(path);
                }
            }
        } else if let Some(caps) = grammar
            .edit_open
            .captures(trimmed)
            .or_else(|| grammar.new_open.captures(trimmed))
        {
            if let Some(prev) = self.open.take() {
                self.set(prev, FileStreamStatus::Complete, touched);
            }
            if let Some(path) = normalize_path(&caps["path"]) {
                self.set(path.clone(), FileStreamStatus::Streaming, touched);
                self.open = Some(path);
            }
        } else if let Some(caps) = grammar.delete.captures(trimmed) {
            if let Some(path) = normalize_path(&caps["path"]) {
                self.set(path, FileStreamStatus::Complete, touched);
            }
        }
    }
}

/// Scan a (possibly partial) buffer for file headers of either format in
/// one pass, including a trailing partial line.
pub fn scan_progress(buffer: &str, grammar: &CompiledGrammar) -> StreamProgress {
    let mut scanner = ProgressScanner::new();
    let mut touched = Vec::new();
    for line in buffer.lines() {
        scanner.scan_line(line, grammar, &mut touched);
    }
    let mut progress = scanner.progress;
    progress.chars_received = buffer.chars().count();
    progress
}
