//! [`SqliteStore`]: the SQLite implementation of [`RevisionHistory`].

use std::path::Path;

use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, error, info, warn};

use revlog_core::{
  change::ChangeRecord,
  replay::{Base, Reconstruction, find_base, replay},
  revision::RevisionMetadata,
  store::{PathSet, RevisionHistory},
};

use crate::{
  Error, Result,
  encode::{RawChange, decode_kind, encode_change},
  error::QueryContext as _,
  query,
  schema::{self, LATEST_VERSION},
};

const IN_MEMORY: &str = ":memory:";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A revision store backed by a single SQLite file.
///
/// Writes run in explicit transactions. If a rollback fails the handle is
/// poisoned and every later call returns [`Error::Poisoned`].
pub struct SqliteStore {
  conn:          Connection,
  poisoned:      bool,
  migrated_from: Option<i64>,
}

impl SqliteStore {
  /// Open (or create) a store at `path`, migrating older schemas.
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let conn = Connection::open(path)
      .map_err(|source| Error::Open { path: path.to_path_buf(), source })?;
    Self::from_connection(conn, path)
  }

  /// Open an empty in-memory store, useful for testing.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|source| Error::Open { path: IN_MEMORY.into(), source })?;
    Self::from_connection(conn, Path::new(IN_MEMORY))
  }

  fn from_connection(mut conn: Connection, path: &Path) -> Result<Self> {
    let migrated_from = schema::initialise(&mut conn, path)?;
    debug!(path = %path.display(), "opened revision store");
    Ok(Self { conn, poisoned: false, migrated_from })
  }

  fn check_usable(&self) -> Result<()> {
    if self.poisoned { Err(Error::Poisoned) } else { Ok(()) }
  }

  #[cfg(test)]
  pub(crate) fn poison(&mut self) { self.poisoned = true; }

  /// Run `work` in a transaction, committing on success.
  ///
  /// On failure the transaction is rolled back and the work's error is
  /// returned. A rollback that itself fails poisons the handle.
  fn in_transaction<T, F>(&mut self, context: &str, work: F) -> Result<T>
  where
    F: FnOnce(&Connection) -> Result<T>,
  {
    self.check_usable()?;

    let tx = self.conn.transaction().map_err(|source| Error::Transaction {
      context: format!("{context}: begin"),
      source,
    })?;

    match work(&tx) {
      Ok(value) => {
        if let Err(source) = tx.commit() {
          if !self.conn.is_autocommit() {
            error!(context, "commit failed and transaction is still open");
            self.poisoned = true;
          }
          return Err(Error::Transaction { context: format!("{context}: commit"), source });
        }
        debug!(context, "committed transaction");
        Ok(value)
      }
      Err(err) => {
        warn!(context, error = %err, "rolling back transaction");
        if let Err(rollback) = tx.rollback() {
          error!(context, error = %rollback, "rollback failed, store must be reopened");
          self.poisoned = true;
        }
        Err(err)
      }
    }
  }

  // ── Revision metadata ─────────────────────────────────────────────────────

  /// Metadata for one revision, or `None` if it does not exist.
  pub fn revision(&self, revision: i64) -> Result<Option<RevisionMetadata>> {
    self.check_usable()?;
    let Some(raw) = query::select_revision(&self.conn, revision)
      .with_context(|| format!("select revision {revision}"))?
    else {
      return Ok(None);
    };
    let startup_files = self.startup_files(revision)?;
    Ok(Some(raw.into_metadata(startup_files)))
  }

  /// Every change recorded in `revision`, ordered by path.
  pub fn changes(&self, revision: i64) -> Result<Vec<ChangeRecord>> {
    self.check_usable()?;
    query::select_revision_changes(&self.conn, revision)
      .with_context(|| format!("select changes of revision {revision}"))?
      .into_iter()
      .map(RawChange::into_record)
      .collect()
  }

  /// Number of change rows in `revision`, without decoding them.
  pub fn change_count(&self, revision: i64) -> Result<i64> {
    self.check_usable()?;
    query::count_revision_changes(&self.conn, revision)
      .with_context(|| format!("count changes of revision {revision}"))
  }

  pub fn startup_files(&self, revision: i64) -> Result<Vec<String>> {
    self.check_usable()?;
    query::select_startup_files(&self.conn, revision)
      .with_context(|| format!("select startup files of revision {revision}"))
  }

  /// `None` for missing revisions and for revisions migrated from version 1.
  pub fn working_directory(&self, revision: i64) -> Result<Option<String>> {
    self.check_usable()?;
    query::select_working_dir(&self.conn, revision)
      .with_context(|| format!("select working directory of revision {revision}"))
  }

  pub fn latest_startup_files(&self) -> Result<Vec<String>> {
    match self.latest_revision_no()? {
      Some(latest) => self.startup_files(latest),
      None => Ok(Vec::new()),
    }
  }

  pub fn latest_working_directory(&self) -> Result<Option<String>> {
    match self.latest_revision_no()? {
      Some(latest) => self.working_directory(latest),
      None => Ok(None),
    }
  }

  pub fn is_empty(&self) -> Result<bool> { Ok(self.latest_revision_no()?.is_none()) }

  // ── Maintenance ───────────────────────────────────────────────────────────

  /// Delete every revision. Revision numbers are not reused afterwards.
  pub fn clear(&mut self) -> Result<()> {
    self.in_transaction("clear", |conn| {
      query::clear(conn).with_context(|| "delete all revisions".to_owned())
    })?;
    info!("cleared revision store");
    Ok(())
  }

  /// The schema version recorded in the store.
  pub fn version(&self) -> Result<i64> {
    self.check_usable()?;
    schema::read_version(&self.conn)
      .with_context(|| "read schema version".to_owned())
      .map(|v| v.unwrap_or_default())
  }

  pub fn is_version_old(&self) -> Result<bool> { Ok(self.version()? < LATEST_VERSION) }

  /// The schema version this handle migrated from when it was opened.
  pub fn migrated_from(&self) -> Option<i64> { self.migrated_from }

  fn unchanged_since(
    &self,
    revision: i64,
    working_dir: &str,
    startup_files: &[String],
  ) -> Result<bool> {
    Ok(
      self.working_directory(revision)?.as_deref() == Some(working_dir)
        && self.startup_files(revision)? == startup_files,
    )
  }
}

// ─── RevisionHistory impl ────────────────────────────────────────────────────

impl RevisionHistory for SqliteStore {
  type Error = Error;

  // ── Writes ────────────────────────────────────────────────────────────────

  fn store_new_revision(
    &mut self,
    changes: &[ChangeRecord],
    working_dir: &str,
    startup_files: &[String],
  ) -> Result<i64> {
    self.check_usable()?;

    let changes: Vec<&ChangeRecord> = changes.iter().filter(|c| c.is_persistable()).collect();
    let parent = self.latest_revision_no()?;

    if changes.is_empty()
      && let Some(latest) = parent
      && self.unchanged_since(latest, working_dir, startup_files)?
    {
      debug!(revision = latest, "nothing changed, no revision stored");
      return Ok(latest);
    }

    let encoded = changes
      .iter()
      .map(|c| Ok((c.kind().code(), c.file_path.as_str(), encode_change(&c.change)?)))
      .collect::<Result<Vec<_>>>()?;
    let timestamp = Utc::now().timestamp();

    let revision = self.in_transaction("store revision", |conn| {
      let revision = query::insert_revision(conn, parent, working_dir, timestamp)
        .with_context(|| "insert revision".to_owned())?;
      for path in startup_files {
        query::insert_startup_file(conn, revision, path)
          .with_context(|| format!("insert startup file {path}"))?;
      }
      for (kind, path, data) in &encoded {
        query::insert_change(conn, revision, *kind, path, data)
          .with_context(|| format!("insert change for {path}"))?;
      }
      Ok(revision)
    })?;

    info!(revision, changes = encoded.len(), "stored revision");
    Ok(revision)
  }

  fn delete_revision(&mut self, revision: i64) -> Result<()> {
    self.in_transaction("delete revision", |conn| {
      query::detach_children(conn, revision)
        .with_context(|| format!("detach children of revision {revision}"))?;
      let removed = query::delete_revision(conn, revision)
        .with_context(|| format!("delete revision {revision}"))?;
      if removed == 0 {
        return Err(Error::RevisionNotFound(revision));
      }
      Ok(())
    })?;
    info!(revision, "deleted revision");
    Ok(())
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  fn latest_revision_no(&self) -> Result<Option<i64>> {
    self.check_usable()?;
    query::latest_revision_no(&self.conn).with_context(|| "select latest revision".to_owned())
  }

  fn revisions(&self) -> Result<Vec<RevisionMetadata>> {
    self.check_usable()?;
    let raws = query::select_revisions(&self.conn).with_context(|| "select revisions".to_owned())?;
    raws
      .into_iter()
      .map(|raw| {
        let startup_files = self.startup_files(raw.revision_no)?;
        Ok(raw.into_metadata(startup_files))
      })
      .collect()
  }

  fn reconstruct(&self, path: &str, revision: i64) -> Result<Reconstruction> {
    self.check_usable()?;

    let newest_first = query::select_history_kinds(&self.conn, path, revision)
      .with_context(|| format!("select history of {path} at revision {revision}"))?
      .into_iter()
      .map(|(rev, code)| Ok((rev, decode_kind(code)?)))
      .collect::<Result<Vec<_>>>()?;

    let base = match find_base(path, newest_first)? {
      Base::Found(base) => base,
      Base::Absent | Base::Orphaned => return Ok(Reconstruction::default()),
    };

    let records = query::select_changes_between(&self.conn, path, base, revision)
      .with_context(|| format!("select changes of {path} in {base}..={revision}"))?
      .into_iter()
      .map(RawChange::into_record)
      .collect::<Result<Vec<_>>>()?;

    Ok(replay(path, records)?)
  }

  fn existing_file_paths(&self, revision: i64) -> Result<PathSet> {
    self.check_usable()?;
    let paths = query::select_existing_paths(&self.conn, revision)
      .with_context(|| format!("select existing paths at revision {revision}"))?;
    Ok(paths.into_iter().collect())
  }

  fn all_file_paths(&self, revision: i64) -> Result<PathSet> {
    self.check_usable()?;
    let paths = query::select_all_paths(&self.conn, revision)
      .with_context(|| format!("select all paths at revision {revision}"))?;
    Ok(paths.into_iter().collect())
  }
}
