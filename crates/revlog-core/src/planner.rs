//! Change planning: choosing which record to emit for each file when a
//! project is snapshotted.
//!
//! A file unknown to the latest revision becomes a `NewFile`. A file whose
//! reconstruction already replays a long delta chain is stored in full to
//! start a new checkpoint. Everything else is diffed against its previous
//! content. A file whose stored history cannot be replayed is stored in full
//! so the damage does not block the rest of the snapshot.

use tracing::{debug, warn};

use crate::{
  change::ChangeRecord,
  delta::apply_all,
  diff::diff_buffers,
  store::{FileMap, HistoryError as _, PathSet, RevisionHistory},
};

/// Replay chains longer than this get a `ChangeFull` checkpoint.
pub const MAX_SEQUENTIAL_DELTAS: usize = 100;

/// Plan the change record for one file given its current content.
///
/// Returns a `NoChange` record when the content matches the latest revision.
pub fn plan_file_change<H>(
  history: &H,
  path: &str,
  content: &[u8],
) -> Result<ChangeRecord, H::Error>
where
  H: RevisionHistory + ?Sized,
{
  let Some(latest) = history.latest_revision_no()? else {
    return Ok(ChangeRecord::new_file(path, content));
  };

  let previous = match history.reconstruct(path, latest) {
    Ok(previous) => previous,
    Err(err) if err.is_corrupt_data() => {
      warn!(path, revision = latest, error = %err, "history unreadable, storing in full");
      return Ok(ChangeRecord::full(path, content));
    }
    Err(err) => return Err(err),
  };
  let Some(old) = previous.content else {
    return Ok(ChangeRecord::new_file(path, content));
  };

  if old == content {
    return Ok(ChangeRecord::no_change(path));
  }
  if previous.records_replayed > MAX_SEQUENTIAL_DELTAS {
    debug!(path, chain = previous.records_replayed, "starting new full checkpoint");
    return Ok(ChangeRecord::full(path, content));
  }

  let deltas = diff_buffers(&old, content);
  let mut replayed = old;
  apply_all(&mut replayed, &deltas);
  if replayed != content {
    // A trailing terminator byte in `old` shields the end of the buffer.
    debug!(path, "delta does not reproduce content, storing in full");
    return Ok(ChangeRecord::full(path, content));
  }

  Ok(ChangeRecord::delta(path, deltas))
}

/// Plan the changes that turn the latest revision into `files`.
///
/// Files present at the latest revision but missing from `files` are
/// recorded as removed. Unchanged files are omitted.
pub fn plan_snapshot<H>(history: &H, files: &FileMap) -> Result<Vec<ChangeRecord>, H::Error>
where
  H: RevisionHistory + ?Sized,
{
  let existing = match history.latest_revision_no()? {
    Some(latest) => history.existing_file_paths(latest)?,
    None => PathSet::new(),
  };

  let mut changes = Vec::new();
  for (path, content) in files {
    let record = plan_file_change(history, path, content)?;
    if record.is_persistable() {
      changes.push(record);
    }
  }
  changes.extend(
    existing
      .iter()
      .filter(|path| !files.contains_key(*path))
      .map(ChangeRecord::removed),
  );

  Ok(changes)
}

/// Plan and store a snapshot of `files` in one step, returning the revision
/// number (the previous one if nothing changed).
pub fn commit_snapshot<H>(
  history: &mut H,
  files: &FileMap,
  working_dir: &str,
  startup_files: &[String],
) -> Result<i64, H::Error>
where
  H: RevisionHistory + ?Sized,
{
  let changes = plan_snapshot(&*history, files)?;
  history.store_new_revision(&changes, working_dir, startup_files)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    change::{Change, ChangeKind},
    delta::TextDelta,
    replay::{Base, Reconstruction, find_base, replay},
    revision::RevisionMetadata,
  };

  /// Minimal in-memory history used to drive the planner.
  #[derive(Default)]
  struct MemoryHistory {
    revisions: Vec<RevisionMetadata>,
    records:   Vec<ChangeRecord>,
  }

  impl MemoryHistory {
    fn history_of(&self, path: &str, revision: i64) -> Vec<ChangeRecord> {
      self
        .records
        .iter()
        .filter(|r| r.file_path == path && r.revision_number <= revision)
        .cloned()
        .collect()
    }
  }

  impl RevisionHistory for MemoryHistory {
    type Error = crate::Error;

    fn store_new_revision(
      &mut self,
      changes: &[ChangeRecord],
      working_dir: &str,
      startup_files: &[String],
    ) -> crate::Result<i64> {
      let revision_no = self.revisions.len() as i64 + 1;
      self.revisions.push(RevisionMetadata {
        revision_no,
        parent_revision_no: None,
        working_dir: Some(working_dir.to_owned()),
        timestamp: 0,
        startup_files: startup_files.to_vec(),
      });
      for change in changes.iter().filter(|c| c.is_persistable()) {
        let mut change = change.clone();
        change.revision_number = revision_no;
        self.records.push(change);
      }
      Ok(revision_no)
    }

    fn delete_revision(&mut self, revision: i64) -> crate::Result<()> {
      self.revisions.retain(|r| r.revision_no != revision);
      self.records.retain(|r| r.revision_number != revision);
      Ok(())
    }

    fn latest_revision_no(&self) -> crate::Result<Option<i64>> {
      Ok(self.revisions.last().map(|r| r.revision_no))
    }

    fn revisions(&self) -> crate::Result<Vec<RevisionMetadata>> { Ok(self.revisions.clone()) }

    fn reconstruct(&self, path: &str, revision: i64) -> crate::Result<Reconstruction> {
      let history = self.history_of(path, revision);
      let newest_first = history.iter().rev().map(|r| (r.revision_number, r.kind()));
      match find_base(path, newest_first)? {
        Base::Found(base) => replay(
          path,
          history.into_iter().filter(|r| r.revision_number >= base),
        ),
        Base::Absent | Base::Orphaned => Ok(Reconstruction::default()),
      }
    }

    fn existing_file_paths(&self, revision: i64) -> crate::Result<PathSet> {
      Ok(
        self
          .all_file_paths(revision)?
          .into_iter()
          .filter(|p| {
            self.history_of(p, revision).last().map(ChangeRecord::kind)
              != Some(ChangeKind::RemovedFile)
          })
          .collect(),
      )
    }

    fn all_file_paths(&self, revision: i64) -> crate::Result<PathSet> {
      Ok(
        self
          .records
          .iter()
          .filter(|r| r.revision_number <= revision)
          .map(|r| r.file_path.clone())
          .collect(),
      )
    }
  }

  fn files(entries: &[(&str, &str)]) -> FileMap {
    entries
      .iter()
      .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
      .collect()
  }

  #[test]
  fn first_snapshot_creates_new_files() {
    let history = MemoryHistory::default();
    let planned = plan_snapshot(&history, &files(&[("a.txt", "A"), ("b.txt", "B")])).unwrap();
    assert_eq!(planned, vec![
      ChangeRecord::new_file("a.txt", "A"),
      ChangeRecord::new_file("b.txt", "B"),
    ]);
  }

  #[test]
  fn modified_file_becomes_delta_and_unchanged_is_skipped() {
    let mut history = MemoryHistory::default();
    commit_snapshot(&mut history, &files(&[("a", "one\n"), ("b", "same")]), ".", &[]).unwrap();

    let planned = plan_snapshot(&history, &files(&[("a", "one\ntwo\n"), ("b", "same")])).unwrap();
    assert_eq!(planned.len(), 1);
    assert_eq!(planned[0].file_path, "a");
    assert!(matches!(planned[0].change, Change::ChangeDelta(_)));
  }

  #[test]
  fn missing_file_is_removed_and_returning_file_is_new() {
    let mut history = MemoryHistory::default();
    commit_snapshot(&mut history, &files(&[("a", "x"), ("b", "y")]), ".", &[]).unwrap();

    let rev = commit_snapshot(&mut history, &files(&[("a", "x")]), ".", &[]).unwrap();
    assert_eq!(history.get_file_at_revision("b", rev).unwrap(), None);
    assert!(history.records.contains(&{
      let mut r = ChangeRecord::removed("b");
      r.revision_number = rev;
      r
    }));

    let planned = plan_snapshot(&history, &files(&[("a", "x"), ("b", "back")])).unwrap();
    assert_eq!(planned, vec![ChangeRecord::new_file("b", "back")]);
  }

  #[test]
  fn long_delta_chain_gets_full_checkpoint() {
    let mut history = MemoryHistory::default();
    let mut text = String::from("start\n");
    commit_snapshot(&mut history, &files(&[("a", text.as_str())]), ".", &[]).unwrap();

    for i in 0..MAX_SEQUENTIAL_DELTAS {
      text.push_str(&format!("line {i}\n"));
      commit_snapshot(&mut history, &files(&[("a", text.as_str())]), ".", &[]).unwrap();
    }

    text.push_str("last\n");
    let record = plan_file_change(&history, "a", text.as_bytes()).unwrap();
    assert_eq!(record, ChangeRecord::full("a", text.as_bytes()));
  }

  #[test]
  fn unreplayable_history_is_reseeded_in_full() {
    let mut history = MemoryHistory::default();
    commit_snapshot(&mut history, &files(&[("a", "x"), ("b", "keep")]), ".", &[]).unwrap();
    history.store_new_revision(&[ChangeRecord::removed("a")], ".", &[]).unwrap();
    history
      .store_new_revision(&[ChangeRecord::delta("a", vec![TextDelta::insert(0, "y")])], ".", &[])
      .unwrap();
    assert!(history.get_file_at_revision("a", 3).is_err());

    let record = plan_file_change(&history, "a", b"fresh").unwrap();
    assert_eq!(record, ChangeRecord::full("a", "fresh"));

    let rev = commit_snapshot(&mut history, &files(&[("a", "fresh"), ("b", "kept")]), ".", &[])
      .unwrap();
    assert_eq!(history.get_file_at_revision("a", rev).unwrap(), Some(b"fresh".to_vec()));
    assert_eq!(history.get_file_at_revision("b", rev).unwrap(), Some(b"kept".to_vec()));
  }

  #[test]
  fn terminated_binary_content_is_stored_in_full() {
    let mut history = MemoryHistory::default();
    let old = b"bin\0".to_vec();
    let map: FileMap = [("blob".to_owned(), old)].into();
    commit_snapshot(&mut history, &map, ".", &[]).unwrap();

    let new = b"bin\0tail".to_vec();
    let record = plan_file_change(&history, "blob", &new).unwrap();
    assert_eq!(record, ChangeRecord::full("blob", new));
  }

  #[test]
  fn planned_deltas_reconstruct_exactly() {
    let mut history = MemoryHistory::default();
    let versions = ["fn main() {}\n", "fn main() {\n  run();\n}\n", "// header\nfn main() {\n}\n"];
    let mut revs = Vec::new();
    for v in versions {
      revs.push(commit_snapshot(&mut history, &files(&[("main.rs", v)]), ".", &[]).unwrap());
    }
    for (rev, v) in revs.iter().zip(versions) {
      let got = history.get_file_at_revision("main.rs", *rev).unwrap();
      assert_eq!(got.as_deref(), Some(v.as_bytes()));
    }
  }
}
