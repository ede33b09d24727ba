// history.rs — History subcommands: log, undo, redo, goto, checkpoint.

use pw_generation::ProjectPaths;
use pw_workspace::{EntryKind, VersionedFileStore};

use super::{load_store, save_store};

pub fn log(paths: &ProjectPaths) -> anyhow::Result<()> {
    let store = load_store(paths)?;
    print!("{}", render_log(&store));
    Ok(())
}

pub fn undo(paths: &ProjectPaths) -> anyhow::Result<()> {
    let mut store = load_store(paths)?;
    if store.undo().is_none() {
        println!("Nothing to undo.");
        return Ok(());
    }
    save_store(paths, &store)?;
    print_current(&store);
    Ok(())
}

pub fn redo(paths: &ProjectPaths) -> anyhow::Result<()> {
    let mut store = load_store(paths)?;
    if store.redo().is_none() {
        println!("Nothing to redo.");
        return Ok(());
    }
    save_store(paths, &store)?;
    print_current(&store);
    Ok(())
}

pub fn goto(paths: &ProjectPaths, index: usize) -> anyhow::Result<()> {
    let mut store = load_store(paths)?;
    store.go_to_index(index)?;
    save_store(paths, &store)?;
    print_current(&store);
    Ok(())
}

pub fn checkpoint(paths: &ProjectPaths, name: &str, restore: bool) -> anyhow::Result<()> {
    let mut store = load_store(paths)?;
    if restore {
        store.go_to_checkpoint(name)?;
        save_store(paths, &store)?;
        print_current(&store);
    } else {
        store.snapshot(name);
        save_store(paths, &store)?;
        println!("Checkpoint '{}' saved as entry #{}", name, store.current_index());
    }
    Ok(())
}

fn print_current(store: &VersionedFileStore) {
    let entry = store.current();
    println!(
        "Now at entry #{} of {}: {} ({} file(s))",
        store.current_index(),
        store.len(),
        entry.label,
        entry.files.len()
    );
}

fn render_log(store: &VersionedFileStore) -> String {
    let mut out = format!(
        "  {:<5} {:<20} {:<11} {:>6}  LABEL\n",
        "#", "TIMESTAMP", "KIND", "FILES"
    );
    out.push_str(&"-".repeat(72));
    out.push('\n');

    for (index, entry) in store.entries().iter().enumerate() {
        let cursor = if index == store.current_index() { '*' } else { ' ' };
        let kind = match entry.kind {
            EntryKind::Initial => "initial",
            EntryKind::Commit => "commit",
            EntryKind::Checkpoint => "checkpoint",
        };
        out.push_str(&format!(
            "{} {:<5} {:<20} {:<11} {:>6}  {}\n",
            cursor,
            index,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            kind,
            entry.files.len(),
            entry.label
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pw_changeset::FileMap;
    use tempfile::tempdir;

    fn project() -> (tempfile::TempDir, ProjectPaths) {
        let dir = tempdir().unwrap();
        let paths = ProjectPaths::for_project(dir.path());
        let mut files = FileMap::new();
        files.insert("a.ts".into(), "1\n".into());
        let mut store = VersionedFileStore::new(files.clone());
        files.insert("a.ts".into(), "2\n".into());
        store.commit(files, "second");
        save_store(&paths, &store).unwrap();
        (dir, paths)
    }

    #[test]
    fn undo_and_redo_persist_cursor() {
        let (_dir, paths) = project();
        undo(&paths).unwrap();
        assert_eq!(load_store(&paths).unwrap().current_index(), 0);
        // Nothing further back; still succeeds.
        undo(&paths).unwrap();
        redo(&paths).unwrap();
        assert_eq!(load_store(&paths).unwrap().current_index(), 1);
    }

    #[test]
    fn goto_out_of_range_is_an_error() {
        let (_dir, paths) = project();
        assert!(goto(&paths, 5).is_err());
        goto(&paths, 0).unwrap();
        assert_eq!(load_store(&paths).unwrap().current_files()["a.ts"], "1\n");
    }

    #[test]
    fn checkpoint_create_and_restore() {
        let (_dir, paths) = project();
        checkpoint(&paths, "v1", false).unwrap();
        goto(&paths, 0).unwrap();
        checkpoint(&paths, "v1", true).unwrap();

        let store = load_store(&paths).unwrap();
        assert_eq!(store.current_index(), 2);
        assert_eq!(store.current().label, "v1");
        assert!(checkpoint(&paths, "missing", true).is_err());
    }

    #[test]
    fn log_marks_current_entry() {
        let (_dir, paths) = project();
        let store = load_store(&paths).unwrap();
        let rendered = render_log(&store);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[3].starts_with("* 1"));
        assert!(lines[3].ends_with("second"));
        assert!(lines[2].contains("initial"));
    }
}
