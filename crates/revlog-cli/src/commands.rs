//! Subcommand implementations. Output goes to the supplied writer so the
//! commands can be exercised without a terminal.

use std::{
  io::Write,
  path::{Path, PathBuf},
};

use anyhow::{Context as _, bail};
use revlog_core::{planner::commit_snapshot, revision::RevisionMetadata, store::RevisionHistory};
use revlog_store_sqlite::SqliteStore;
use similar::TextDiff;
use tracing::{info, warn};

use crate::snapshot::{collect_files, write_files};

// ─── Reads ───────────────────────────────────────────────────────────────────

pub fn log(store: &SqliteStore, json: bool, out: &mut impl Write) -> anyhow::Result<()> {
  let revisions = store.revisions().context("failed to list revisions")?;

  if json {
    serde_json::to_writer_pretty(&mut *out, &revisions).context("failed to encode revisions")?;
    writeln!(out)?;
    return Ok(());
  }

  for rev in &revisions {
    let when = rev
      .recorded_at()
      .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
      .unwrap_or_else(|| "-".to_owned());
    let changes = store
      .change_count(rev.revision_no)
      .with_context(|| format!("failed to count changes of revision {}", rev.revision_no))?;
    write!(
      out,
      "{:>6}  {when}  {}  {changes} change(s)",
      rev.revision_no,
      rev.working_dir.as_deref().unwrap_or("-"),
    )?;
    if !rev.startup_files.is_empty() {
      write!(out, "  startup: {}", rev.startup_files.join(", "))?;
    }
    writeln!(out)?;
  }
  Ok(())
}

pub fn ls<H>(history: &H, revision: i64, all: bool, out: &mut impl Write) -> anyhow::Result<()>
where
  H: RevisionHistory,
{
  let paths = if all {
    history.all_file_paths(revision)
  } else {
    history.existing_file_paths(revision)
  }
  .with_context(|| format!("failed to list files at revision {revision}"))?;

  for path in paths {
    writeln!(out, "{path}")?;
  }
  Ok(())
}

pub fn show<H>(history: &H, path: &str, revision: i64, out: &mut impl Write) -> anyhow::Result<()>
where
  H: RevisionHistory,
{
  let content = history
    .get_file_at_revision(path, revision)
    .with_context(|| format!("failed to reconstruct {path} at revision {revision}"))?;
  let Some(content) = content else {
    bail!("{path} does not exist at revision {revision}");
  };
  out.write_all(&content)?;
  Ok(())
}

/// Print what `revision` changed: its working directory and startup files
/// against the revision before it, then a unified diff per changed file.
pub fn diff(store: &SqliteStore, revision: i64, out: &mut impl Write) -> anyhow::Result<()> {
  let Some(current) = store.revision(revision).context("failed to read revision")? else {
    bail!("revision {revision} does not exist");
  };
  let previous = store
    .revisions()
    .context("failed to list revisions")?
    .into_iter()
    .filter(|r| r.revision_no < revision)
    .max_by_key(|r| r.revision_no);

  write_metadata_changes(previous.as_ref(), &current, out)?;

  let changes = store
    .changes(revision)
    .with_context(|| format!("failed to read changes of revision {revision}"))?;
  for change in &changes {
    let path = change.file_path.as_str();
    writeln!(out, "{} {path}", change.kind().as_str())?;

    let sides = store
      .get_file_at_revision(path, revision - 1)
      .and_then(|old| Ok((old, store.get_file_at_revision(path, revision)?)));
    let (old, new) = match sides {
      Ok(sides) => sides,
      Err(err) => {
        warn!(path, revision, error = %err, "cannot reconstruct file for diff");
        writeln!(out, "  cannot reconstruct: {err}")?;
        continue;
      }
    };

    let old = String::from_utf8_lossy(old.as_deref().unwrap_or_default());
    let new = String::from_utf8_lossy(new.as_deref().unwrap_or_default());
    let text = TextDiff::from_lines(&*old, &*new);
    write!(out, "{}", text.unified_diff().header(&format!("a/{path}"), &format!("b/{path}")))?;
  }
  Ok(())
}

fn write_metadata_changes(
  previous: Option<&RevisionMetadata>,
  current: &RevisionMetadata,
  out: &mut impl Write,
) -> anyhow::Result<()> {
  let old_dir = previous.and_then(|p| p.working_dir.as_deref());
  let new_dir = current.working_dir.as_deref();
  if old_dir != new_dir {
    writeln!(out, "working dir: {} -> {}", old_dir.unwrap_or("-"), new_dir.unwrap_or("-"))?;
  }

  let old_startup = previous.map(|p| p.startup_files.as_slice()).unwrap_or_default();
  for file in old_startup.iter().filter(|f| !current.startup_files.contains(*f)) {
    writeln!(out, "startup -{file}")?;
  }
  for file in current.startup_files.iter().filter(|f| !old_startup.contains(*f)) {
    writeln!(out, "startup +{file}")?;
  }
  Ok(())
}

/// Write every file existing at `revision` under `dir`; returns the count.
pub fn export<H>(history: &H, revision: i64, dir: &Path) -> anyhow::Result<usize>
where
  H: RevisionHistory,
{
  let files = history
    .existing_files(revision)
    .with_context(|| format!("failed to read files at revision {revision}"))?;
  write_files(dir, &files)?;
  info!(revision, files = files.len(), dir = %dir.display(), "exported revision");
  Ok(files.len())
}

// ─── Writes ──────────────────────────────────────────────────────────────────

/// Snapshot `dir` into a new revision and return its number.
pub fn snapshot<H>(
  history: &mut H,
  dir: &Path,
  exclude: &[PathBuf],
  working_dir: &str,
  startup_files: &[String],
) -> anyhow::Result<i64>
where
  H: RevisionHistory,
{
  let files = collect_files(dir, exclude)?;
  let revision = commit_snapshot(history, &files, working_dir, startup_files)
    .with_context(|| format!("failed to snapshot {}", dir.display()))?;
  Ok(revision)
}

/// Revisions recorded by [`restore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restored {
  /// Snapshot of `dir` taken before any file was overwritten.
  pub backup:   i64,
  /// Snapshot of `dir` after the restore, carrying the target's metadata.
  pub restored: i64,
  pub files:    usize,
}

/// Bring `dir` back to `revision`.
///
/// The directory is snapshotted first so the current state can be recovered.
/// Files existing at `revision` are then written over it and a new revision
/// records the result with the target's working directory and startup
/// files. Files that did not exist at `revision` are left in place.
pub fn restore(
  store: &mut SqliteStore,
  revision: i64,
  dir: &Path,
  exclude: &[PathBuf],
  working_dir: &str,
) -> anyhow::Result<Restored> {
  let Some(target) = store.revision(revision).context("failed to read revision")? else {
    bail!("revision {revision} does not exist");
  };
  let files = store
    .existing_files(revision)
    .with_context(|| format!("failed to read files at revision {revision}"))?;

  let current_dir = store
    .latest_working_directory()
    .context("failed to read working directory")?
    .unwrap_or_else(|| working_dir.to_owned());
  let current_startup = store.latest_startup_files().context("failed to read startup files")?;
  let backup = snapshot(store, dir, exclude, &current_dir, &current_startup)
    .context("failed to back up before restoring")?;

  write_files(dir, &files)?;

  let restored_dir = target.working_dir.unwrap_or(current_dir);
  let restored = snapshot(store, dir, exclude, &restored_dir, &target.startup_files)?;
  info!(revision, backup, restored, files = files.len(), "restored revision");
  Ok(Restored { backup, restored, files: files.len() })
}

pub fn delete<H>(history: &mut H, revision: i64) -> anyhow::Result<()>
where
  H: RevisionHistory,
{
  history
    .delete_revision(revision)
    .with_context(|| format!("failed to delete revision {revision}"))
}

pub fn clear(store: &mut SqliteStore) -> anyhow::Result<()> {
  store.clear().context("failed to clear revision store")
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;

  fn store() -> SqliteStore { SqliteStore::open_in_memory().unwrap() }

  #[test]
  fn snapshot_export_round_trip() {
    let project = tempfile::tempdir().unwrap();
    fs::create_dir_all(project.path().join("lib")).unwrap();
    fs::write(project.path().join("main.lua"), "print(1)\n").unwrap();
    fs::write(project.path().join("lib/util.lua"), "return {}\n").unwrap();

    let mut s = store();
    let startup = vec!["main.lua".to_owned()];
    let r1 = snapshot(&mut s, project.path(), &[], "/proj", &startup).unwrap();

    fs::write(project.path().join("main.lua"), "print(2)\n").unwrap();
    fs::remove_file(project.path().join("lib/util.lua")).unwrap();
    let r2 = snapshot(&mut s, project.path(), &[], "/proj", &startup).unwrap();
    assert!(r2 > r1);

    let out = tempfile::tempdir().unwrap();
    assert_eq!(export(&s, r1, out.path()).unwrap(), 2);
    assert_eq!(fs::read_to_string(out.path().join("lib/util.lua")).unwrap(), "return {}\n");
    assert_eq!(fs::read_to_string(out.path().join("main.lua")).unwrap(), "print(1)\n");

    let mut listing = Vec::new();
    ls(&s, r2, true, &mut listing).unwrap();
    assert_eq!(String::from_utf8(listing).unwrap(), "lib/util.lua\nmain.lua\n");

    let mut listing = Vec::new();
    ls(&s, r2, false, &mut listing).unwrap();
    assert_eq!(String::from_utf8(listing).unwrap(), "main.lua\n");
  }

  #[test]
  fn unchanged_snapshot_reuses_revision() {
    let project = tempfile::tempdir().unwrap();
    fs::write(project.path().join("a"), "a").unwrap();

    let mut s = store();
    let r1 = snapshot(&mut s, project.path(), &[], ".", &[]).unwrap();
    let r2 = snapshot(&mut s, project.path(), &[], ".", &[]).unwrap();
    assert_eq!(r1, r2);
  }

  #[test]
  fn show_missing_file_fails() {
    let mut s = store();
    s.store_new_revision(
      &[revlog_core::change::ChangeRecord::new_file("a", "body")],
      ".",
      &[],
    )
    .unwrap();

    let mut out = Vec::new();
    show(&s, "a", 1, &mut out).unwrap();
    assert_eq!(out, b"body");
    assert!(show(&s, "b", 1, &mut Vec::new()).is_err());
  }

  #[test]
  fn log_lists_revisions() {
    let mut s = store();
    s.store_new_revision(&[], "/w", &["boot.lua".to_owned()]).unwrap();

    let mut out = Vec::new();
    log(&s, false, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("/w"));
    assert!(text.contains("startup: boot.lua"));

    let mut out = Vec::new();
    log(&s, true, &mut out).unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(parsed[0]["revision_no"], 1);
    assert_eq!(parsed[0]["startup_files"][0], "boot.lua");
  }

  #[test]
  fn log_counts_changes_without_decoding_them() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("history.db");
    let mut s = SqliteStore::open(&db).unwrap();
    s.store_new_revision(
      &[
        revlog_core::change::ChangeRecord::new_file("a", "1"),
        revlog_core::change::ChangeRecord::new_file("b", "2"),
      ],
      "/w",
      &[],
    )
    .unwrap();

    let raw = rusqlite::Connection::open(&db).unwrap();
    raw.execute("UPDATE change SET data = x'00' WHERE filePath = 'a'", []).unwrap();
    drop(raw);

    let mut out = Vec::new();
    log(&s, false, &mut out).unwrap();
    assert!(String::from_utf8(out).unwrap().contains("2 change(s)"));
  }

  #[test]
  fn diff_shows_file_and_metadata_changes() {
    let project = tempfile::tempdir().unwrap();
    fs::write(project.path().join("a.txt"), "one\n").unwrap();

    let mut s = store();
    snapshot(&mut s, project.path(), &[], "/w", &[]).unwrap();

    fs::write(project.path().join("a.txt"), "one\ntwo\n").unwrap();
    fs::write(project.path().join("b.txt"), "bee\n").unwrap();
    let startup = vec!["a.txt".to_owned()];
    let r2 = snapshot(&mut s, project.path(), &[], "/x", &startup).unwrap();

    let mut out = Vec::new();
    diff(&s, r2, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("working dir: /w -> /x"), "{text}");
    assert!(text.contains("startup +a.txt"), "{text}");
    assert!(text.contains("change_delta a.txt"), "{text}");
    assert!(text.contains("+++ b/a.txt"), "{text}");
    assert!(text.contains("+two"), "{text}");
    assert!(text.contains("new_file b.txt"), "{text}");
    assert!(text.contains("+bee"), "{text}");

    assert!(diff(&s, 99, &mut Vec::new()).is_err());
  }

  #[test]
  fn restore_backs_up_then_rewrites_files() {
    let project = tempfile::tempdir().unwrap();
    let main = project.path().join("main.lua");
    fs::write(&main, "v1").unwrap();

    let mut s = store();
    let boot = vec!["main.lua".to_owned()];
    let r1 = snapshot(&mut s, project.path(), &[], "/one", &boot).unwrap();

    fs::write(&main, "v2").unwrap();
    fs::write(project.path().join("extra.lua"), "x").unwrap();
    let r2 = snapshot(&mut s, project.path(), &[], "/two", &[]).unwrap();

    // Unrecorded edit that the backup must capture.
    fs::write(&main, "v3").unwrap();

    let outcome = restore(&mut s, r1, project.path(), &[], "/fallback").unwrap();
    assert!(outcome.backup > r2);
    assert!(outcome.restored > outcome.backup);
    assert_eq!(outcome.files, 1);

    assert_eq!(fs::read_to_string(&main).unwrap(), "v1");
    assert!(project.path().join("extra.lua").exists());
    assert_eq!(s.get_file_at_revision("main.lua", outcome.backup).unwrap(), Some(b"v3".to_vec()));
    assert_eq!(s.working_directory(outcome.backup).unwrap().as_deref(), Some("/two"));

    assert_eq!(s.get_file_at_revision("main.lua", outcome.restored).unwrap(), Some(b"v1".to_vec()));
    assert_eq!(s.working_directory(outcome.restored).unwrap().as_deref(), Some("/one"));
    assert_eq!(s.startup_files(outcome.restored).unwrap(), boot);
  }

  #[test]
  fn restore_of_missing_revision_leaves_directory_alone() {
    let project = tempfile::tempdir().unwrap();
    fs::write(project.path().join("a"), "a").unwrap();

    let mut s = store();
    snapshot(&mut s, project.path(), &[], ".", &[]).unwrap();
    assert!(restore(&mut s, 7, project.path(), &[], ".").is_err());
    assert_eq!(s.latest_revision_no().unwrap(), Some(1));
  }

  #[test]
  fn delete_and_clear() {
    let mut s = store();
    s.store_new_revision(&[], "/a", &[]).unwrap();
    s.store_new_revision(&[], "/b", &[]).unwrap();

    delete(&mut s, 2).unwrap();
    assert!(delete(&mut s, 2).is_err());
    assert_eq!(s.latest_revision_no().unwrap(), Some(1));

    clear(&mut s).unwrap();
    assert!(s.is_empty().unwrap());
  }
}
