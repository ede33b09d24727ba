// diff.rs — Line-level diff between two file maps for the review gate.
//
// Every line carries its old and new line numbers (1-based) so the reviewer
// can see exactly where a change lands. The algorithm is an LCS over the
// middle section left after trimming the common prefix and suffix; very
// large middles fall back to remove-all/add-all to bound memory.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::changeset::FileMap;

/// Above this many LCS cells the middle section is not aligned.
const MAX_LCS_CELLS: usize = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Added,
    Removed,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub kind: LineKind,
    pub old_line: Option<usize>,
    pub new_line: Option<usize>,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileDiffStatus {
    Added,
    Removed,
    Modified,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    pub status: FileDiffStatus,
    pub added: usize,
    pub removed: usize,
    /// Empty for unchanged files.
    pub lines: Vec<DiffLine>,
}

/// Diff of a whole project, one entry per path present on either side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    pub files: Vec<FileDiff>,
    pub total_added: usize,
    pub total_removed: usize,
}

impl DiffReport {
    /// Files that differ between the two sides.
    pub fn changed_files(&self) -> impl Iterator<Item = &FileDiff> {
        self.files
            .iter()
            .filter(|f| f.status != FileDiffStatus::Unchanged)
    }

    pub fn has_changes(&self) -> bool {
        self.changed_files().next().is_some()
    }

    pub fn file(&self, path: &str) -> Option<&FileDiff> {
        self.files.iter().find(|f| f.path == path)
    }
}

/// Compute the diff between `old` and `new`, sorted by path.
pub fn compute_diff(old: &FileMap, new: &FileMap) -> DiffReport {
    let paths: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    let mut report = DiffReport::default();

    for path in paths {
        let file = match (old.get(path), new.get(path)) {
            (Some(before), Some(after)) if before == after => FileDiff {
                path: path.clone(),
                status: FileDiffStatus::Unchanged,
                added: 0,
                removed: 0,
                lines: Vec::new(),
            },
            (Some(before), Some(after)) => file_diff(path, FileDiffStatus::Modified, before, after),
            (None, Some(after)) => file_diff(path, FileDiffStatus::Added, "", after),
            (Some(before), None) => file_diff(path, FileDiffStatus::Removed, before, ""),
            (None, None) => continue,
        };
        report.total_added += file.added;
        report.total_removed += file.removed;
        report.files.push(file);
    }

    report
}

fn file_diff(path: &str, status: FileDiffStatus, before: &str, after: &str) -> FileDiff {
    let lines = diff_lines(before, after);
    let added = lines.iter().filter(|l| l.kind == LineKind::Added).count();
    let removed = lines.iter().filter(|l| l.kind == LineKind::Removed).count();
    FileDiff {
        path: path.to_string(),
        status,
        added,
        removed,
        lines,
    }
}

/// Line diff of two texts with paired line numbers.
///
/// Lines are compared with their terminators, so a final line that gains or
/// loses its newline shows up as removed and added. `content` never carries
/// the terminator.
pub fn diff_lines(before: &str, after: &str) -> Vec<DiffLine> {
    let old: Vec<&str> = before.split_inclusive('\n').collect();
    let new: Vec<&str> = after.split_inclusive('\n').collect();

    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut out = Vec::with_capacity(old.len().max(new.len()));
    let mut old_no = 0;
    let mut new_no = 0;

    for line in &old[..prefix] {
        old_no += 1;
        new_no += 1;
        out.push(unchanged(line, old_no, new_no));
    }

    for op in align(old_mid, new_mid) {
        match op {
            Op::Keep(line) => {
                old_no += 1;
                new_no += 1;
                out.push(unchanged(line, old_no, new_no));
            }
            Op::Remove(line) => {
                old_no += 1;
                out.push(DiffLine {
                    kind: LineKind::Removed,
                    old_line: Some(old_no),
                    new_line: None,
                    content: without_eol(line).to_string(),
                });
            }
            Op::Add(line) => {
                new_no += 1;
                out.push(DiffLine {
                    kind: LineKind::Added,
                    old_line: None,
                    new_line: Some(new_no),
                    content: without_eol(line).to_string(),
                });
            }
        }
    }

    for line in &old[old.len() - suffix..] {
        old_no += 1;
        new_no += 1;
        out.push(unchanged(line, old_no, new_no));
    }

    out
}

fn unchanged(line: &str, old_no: usize, new_no: usize) -> DiffLine {
    DiffLine {
        kind: LineKind::Unchanged,
        old_line: Some(old_no),
        new_line: Some(new_no),
        content: without_eol(line).to_string(),
    }
}

fn without_eol(line: &str) -> &str {
    match line.strip_suffix('\n') {
        Some(line) => line.strip_suffix('\r').unwrap_or(line),
        None => line,
    }
}

enum Op<'a> {
    Keep(&'a str),
    Remove(&'a str),
    Add(&'a str),
}

/// LCS alignment of two line slices. Removals come before additions within
/// a changed hunk.
fn align<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<Op<'a>> {
    let (n, m) = (old.len(), new.len());
    if n == 0 || m == 0 || n.saturating_mul(m) > MAX_LCS_CELLS {
        let mut ops: Vec<Op<'a>> = old.iter().map(|l| Op::Remove(*l)).collect();
        ops.extend(new.iter().map(|l| Op::Add(*l)));
        return ops;
    }

    // table[i][j] = LCS length of old[i..] and new[j..]
    let width = m + 1;
    let mut table = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if old[i] == new[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            ops.push(Op::Keep(old[i]));
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            ops.push(Op::Remove(old[i]));
            i += 1;
        } else {
            ops.push(Op::Add(new[j]));
            j += 1;
        }
    }
    ops.extend(old[i..].iter().map(|l| Op::Remove(*l)));
    ops.extend(new[j..].iter().map(|l| Op::Add(*l)));
    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(pairs: &[(&str, &str)]) -> FileMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn identical_maps_have_no_changes() {
        let a = files(&[("a.ts", "one\ntwo\n"), ("b.ts", "b")]);
        let report = compute_diff(&a, &a);
        assert_eq!(report.total_added, 0);
        assert_eq!(report.total_removed, 0);
        assert!(!report.has_changes());
        assert!(report
            .files
            .iter()
            .all(|f| f.added == 0 && f.removed == 0 && f.status == FileDiffStatus::Unchanged));
    }

    #[test]
    fn modified_line_pairs_numbers() {
        let old = files(&[("a.ts", "one\ntwo\nthree\n")]);
        let new = files(&[("a.ts", "one\nTWO\nthree\nfour\n")]);
        let report = compute_diff(&old, &new);
        let file = report.file("a.ts").unwrap();
        assert_eq!(file.status, FileDiffStatus::Modified);
        assert_eq!(file.added, 2);
        assert_eq!(file.removed, 1);

        let removed = file.lines.iter().find(|l| l.kind == LineKind::Removed).unwrap();
        assert_eq!(removed.content, "two");
        assert_eq!(removed.old_line, Some(2));
        assert_eq!(removed.new_line, None);

        let three = file.lines.iter().find(|l| l.content == "three").unwrap();
        assert_eq!(three.kind, LineKind::Unchanged);
        assert_eq!((three.old_line, three.new_line), (Some(3), Some(3)));

        let four = file.lines.iter().find(|l| l.content == "four").unwrap();
        assert_eq!(four.new_line, Some(4));
    }

    #[test]
    fn added_and_removed_files() {
        let old = files(&[("gone.ts", "x\ny\n")]);
        let new = files(&[("new.ts", "a\n")]);
        let report = compute_diff(&old, &new);
        assert_eq!(report.file("gone.ts").unwrap().status, FileDiffStatus::Removed);
        assert_eq!(report.file("gone.ts").unwrap().removed, 2);
        assert_eq!(report.file("new.ts").unwrap().status, FileDiffStatus::Added);
        assert_eq!(report.total_added, 1);
        assert_eq!(report.total_removed, 2);
    }

    #[test]
    fn trailing_newline_change_is_counted() {
        let old = files(&[("a.ts", "x\na\n")]);
        let new = files(&[("a.ts", "x\na")]);
        let report = compute_diff(&old, &new);
        let file = report.file("a.ts").unwrap();
        assert_eq!(file.status, FileDiffStatus::Modified);
        assert_eq!((file.added, file.removed), (1, 1));
        assert_eq!((report.total_added, report.total_removed), (1, 1));

        let changed: Vec<_> = file
            .lines
            .iter()
            .filter(|l| l.kind != LineKind::Unchanged)
            .map(|l| (l.kind, l.content.as_str()))
            .collect();
        assert_eq!(changed, vec![(LineKind::Removed, "a"), (LineKind::Added, "a")]);
        assert_eq!(file.lines[0].content, "x");
        assert_eq!(file.lines[0].kind, LineKind::Unchanged);
    }

    #[test]
    fn insertion_in_middle_keeps_context() {
        let lines = diff_lines("a\nb\nc\nd", "a\nb\nX\nc\nd");
        let added: Vec<_> = lines.iter().filter(|l| l.kind == LineKind::Added).collect();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].content, "X");
        assert_eq!(added[0].new_line, Some(3));
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn interleaved_edits_align_on_common_lines() {
        let lines = diff_lines("a\nx\nb\ny\nc", "a\nb\nc");
        let removed: Vec<_> = lines
            .iter()
            .filter(|l| l.kind == LineKind::Removed)
            .map(|l| l.content.as_str())
            .collect();
        assert_eq!(removed, vec!["x", "y"]);
        assert!(lines.iter().all(|l| l.kind != LineKind::Added));
    }
}
