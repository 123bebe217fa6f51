//! The `RevisionHistory` trait and supporting collection types.
//!
//! The trait is implemented by storage backends (e.g. `revlog-store-sqlite`).
//! The change planner and the CLI depend on this abstraction, not on any
//! concrete backend.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::{change::ChangeRecord, replay::Reconstruction, revision::RevisionMetadata};

/// Project-relative file paths, sorted.
pub type PathSet = BTreeSet<String>;

/// Project-relative file paths mapped to their content.
pub type FileMap = BTreeMap<String, Vec<u8>>;

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Error type of a [`RevisionHistory`] backend.
pub trait HistoryError: std::error::Error + Send + Sync + 'static {
  /// True when stored history for one file cannot be decoded or replayed,
  /// false when the backend itself failed.
  fn is_corrupt_data(&self) -> bool;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a revision store backend.
///
/// Access is synchronous and single-writer: mutating methods take `&mut self`
/// and callers are responsible for not sharing a handle across threads
/// without external synchronisation.
pub trait RevisionHistory {
  type Error: HistoryError;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Atomically store a new revision holding `changes` and return its number.
  ///
  /// `NoChange` records are dropped. If nothing remains and `working_dir` and
  /// `startup_files` match the latest revision, nothing is written and the
  /// latest revision number is returned.
  fn store_new_revision(
    &mut self,
    changes: &[ChangeRecord],
    working_dir: &str,
    startup_files: &[String],
  ) -> Result<i64, Self::Error>;

  /// Delete a revision and, by cascade, its change and startup-file rows.
  /// Later revisions keep their changes, so their deltas may be orphaned;
  /// any that named it as parent are left without one.
  fn delete_revision(&mut self, revision: i64) -> Result<(), Self::Error>;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// The highest revision number, or `None` when the store is empty.
  fn latest_revision_no(&self) -> Result<Option<i64>, Self::Error>;

  /// All revisions, oldest first, each with its startup files.
  fn revisions(&self) -> Result<Vec<RevisionMetadata>, Self::Error>;

  /// Reconstruct `path` as of `revision`, reporting how many records were
  /// replayed.
  fn reconstruct(&self, path: &str, revision: i64) -> Result<Reconstruction, Self::Error>;

  /// Paths whose latest record at or before `revision` is not a removal.
  fn existing_file_paths(&self, revision: i64) -> Result<PathSet, Self::Error>;

  /// Paths with any record at or before `revision`, removed ones included.
  fn all_file_paths(&self, revision: i64) -> Result<PathSet, Self::Error>;

  /// Content of `path` as of `revision`, or `None` if it did not exist.
  fn get_file_at_revision(
    &self,
    path: &str,
    revision: i64,
  ) -> Result<Option<Vec<u8>>, Self::Error> {
    Ok(self.reconstruct(path, revision)?.content)
  }

  /// Every file existing at `revision`, with its content.
  fn existing_files(&self, revision: i64) -> Result<FileMap, Self::Error> {
    let mut files = FileMap::new();
    for path in self.existing_file_paths(revision)? {
      match self.get_file_at_revision(&path, revision)? {
        Some(content) => {
          files.insert(path, content);
        }
        None => warn!(path = %path, revision, "listed file could not be reconstructed"),
      }
    }
    Ok(files)
  }
}
