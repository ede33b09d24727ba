// project.rs — Import a directory into a new history, export a snapshot.

use std::fs;
use std::path::{Component, Path};

use anyhow::Context;
use pw_changeset::FileMap;
use pw_generation::ProjectPaths;
use pw_workspace::VersionedFileStore;

use super::{load_store, save_store};

/// Directories never imported.
const SKIP_DIRS: &[&str] = &["node_modules", "target", "dist"];

pub fn init(paths: &ProjectPaths, dir: Option<&Path>, force: bool) -> anyhow::Result<()> {
    if paths.history.exists() && !force {
        anyhow::bail!(
            "history already exists at {} (use --force to replace it)",
            paths.history.display()
        );
    }

    let source = dir.unwrap_or(&paths.project_root);
    let files = read_tree(source)?;
    let store = VersionedFileStore::new(files);
    save_store(paths, &store)?;

    println!(
        "Imported {} file(s) from {} into {}",
        store.current_files().len(),
        source.display(),
        paths.history.display()
    );
    Ok(())
}

pub fn export(paths: &ProjectPaths, dir: &Path) -> anyhow::Result<()> {
    let store = load_store(paths)?;
    let written = write_tree(dir, store.current_files())?;
    println!(
        "Exported {} file(s) from entry #{} to {}",
        written,
        store.current_index(),
        dir.display()
    );
    Ok(())
}

/// Read every UTF-8 file under `root` into a file map keyed by relative
/// path with `/` separators. Hidden entries and build output are skipped.
pub fn read_tree(root: &Path) -> anyhow::Result<FileMap> {
    let mut files = FileMap::new();
    read_dir_into(root, root, &mut files)?;
    Ok(files)
}

fn read_dir_into(root: &Path, dir: &Path, files: &mut FileMap) -> anyhow::Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read directory {}", dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy().into_owned();
        if name.starts_with('.') || SKIP_DIRS.contains(&name.as_str()) {
            continue;
        }

        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            read_dir_into(root, &path, files)?;
        } else if file_type.is_file() {
            let bytes = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            match String::from_utf8(bytes) {
                Ok(content) => {
                    files.insert(relative_key(root, &path)?, content);
                }
                Err(_) => tracing::debug!(path = %path.display(), "skipping non-UTF-8 file"),
            }
        }
    }
    Ok(())
}

fn relative_key(root: &Path, path: &Path) -> anyhow::Result<String> {
    let relative = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Write `files` under `dir`. Paths that would escape `dir` are skipped.
pub fn write_tree(dir: &Path, files: &FileMap) -> anyhow::Result<usize> {
    let mut written = 0;
    for (key, content) in files {
        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            tracing::warn!(path = %key, "refusing to export path outside the target directory");
            continue;
        }

        let target = dir.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&target, content).with_context(|| format!("failed to write {}", target.display()))?;
        written += 1;
    }
    Ok(written)
}
