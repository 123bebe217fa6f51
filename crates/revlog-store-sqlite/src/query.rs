//! Typed wrappers around the SQL statements used by [`SqliteStore`].
//!
//! Functions here return raw driver results; the store attaches context.
//!
//! [`SqliteStore`]: crate::SqliteStore

use revlog_core::change::ChangeKind;
use rusqlite::{Connection, OptionalExtension as _, params};

use crate::encode::{RawChange, RawRevision};

fn raw_change(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawChange> {
  Ok(RawChange {
    kind:      row.get(0)?,
    revision:  row.get(1)?,
    file_path: row.get(2)?,
    data:      row.get(3)?,
  })
}

fn raw_revision(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRevision> {
  Ok(RawRevision {
    revision_no:        row.get(0)?,
    parent_revision_no: row.get(1)?,
    working_dir:        row.get(2)?,
    timestamp:          row.get(3)?,
  })
}

// ─── Revisions ───────────────────────────────────────────────────────────────

pub fn latest_revision_no(conn: &Connection) -> rusqlite::Result<Option<i64>> {
  conn.query_row("SELECT max(revNo) FROM revision", [], |row| row.get(0))
}

pub fn insert_revision(
  conn: &Connection,
  parent: Option<i64>,
  working_dir: &str,
  timestamp: i64,
) -> rusqlite::Result<i64> {
  conn
    .prepare_cached(
      "INSERT INTO revision (parentRevNo, workingDir, timestamp) VALUES (?1, ?2, ?3)",
    )?
    .execute(params![parent, working_dir, timestamp])?;
  Ok(conn.last_insert_rowid())
}

pub fn select_revisions(conn: &Connection) -> rusqlite::Result<Vec<RawRevision>> {
  conn
    .prepare_cached(
      "SELECT revNo, parentRevNo, workingDir, timestamp FROM revision
       ORDER BY timestamp ASC, revNo ASC",
    )?
    .query_map([], raw_revision)?
    .collect()
}

pub fn select_revision(conn: &Connection, revision: i64) -> rusqlite::Result<Option<RawRevision>> {
  conn
    .prepare_cached(
      "SELECT revNo, parentRevNo, workingDir, timestamp FROM revision WHERE revNo = ?1",
    )?
    .query_row([revision], raw_revision)
    .optional()
}

pub fn select_working_dir(conn: &Connection, revision: i64) -> rusqlite::Result<Option<String>> {
  Ok(
    conn
      .prepare_cached("SELECT workingDir FROM revision WHERE revNo = ?1")?
      .query_row([revision], |row| row.get::<_, Option<String>>(0))
      .optional()?
      .flatten(),
  )
}

/// Point revisions whose parent is `revision` at no parent instead.
pub fn detach_children(conn: &Connection, revision: i64) -> rusqlite::Result<usize> {
  conn
    .prepare_cached("UPDATE revision SET parentRevNo = NULL WHERE parentRevNo = ?1")?
    .execute([revision])
}

/// Returns the number of revision rows removed.
pub fn delete_revision(conn: &Connection, revision: i64) -> rusqlite::Result<usize> {
  conn.execute("DELETE FROM revision WHERE revNo = ?1", [revision])
}

pub fn count_revision_changes(conn: &Connection, revision: i64) -> rusqlite::Result<i64> {
  conn
    .prepare_cached("SELECT count(*) FROM change WHERE revNo = ?1")?
    .query_row([revision], |row| row.get(0))
}

/// Remove every revision; change and startup-file rows follow by cascade.
pub fn clear(conn: &Connection) -> rusqlite::Result<()> {
  conn.execute_batch("DELETE FROM change; DELETE FROM startupFile; DELETE FROM revision;")
}

// ─── Startup files ───────────────────────────────────────────────────────────

pub fn insert_startup_file(conn: &Connection, revision: i64, path: &str) -> rusqlite::Result<()> {
  conn
    .prepare_cached("INSERT INTO startupFile (revNo, filePath) VALUES (?1, ?2)")?
    .execute(params![revision, path])?;
  Ok(())
}

pub fn select_startup_files(conn: &Connection, revision: i64) -> rusqlite::Result<Vec<String>> {
  conn
    .prepare_cached("SELECT filePath FROM startupFile WHERE revNo = ?1 ORDER BY idx")?
    .query_map([revision], |row| row.get(0))?
    .collect()
}

// ─── Changes ─────────────────────────────────────────────────────────────────

pub fn insert_change(
  conn: &Connection,
  revision: i64,
  kind: i64,
  path: &str,
  data: &[u8],
) -> rusqlite::Result<()> {
  conn
    .prepare_cached("INSERT INTO change (kind, revNo, filePath, data) VALUES (?1, ?2, ?3, ?4)")?
    .execute(params![kind, revision, path, data])?;
  Ok(())
}

/// `(revNo, kind)` for every record of `path` at or before `revision`,
/// newest first.
pub fn select_history_kinds(
  conn: &Connection,
  path: &str,
  revision: i64,
) -> rusqlite::Result<Vec<(i64, i64)>> {
  conn
    .prepare_cached(
      "SELECT revNo, kind FROM change WHERE filePath = ?1 AND revNo <= ?2
       ORDER BY revNo DESC, chIdx DESC",
    )?
    .query_map(params![path, revision], |row| Ok((row.get(0)?, row.get(1)?)))?
    .collect()
}

/// Records of `path` with `from <= revNo <= to`, in insertion order.
pub fn select_changes_between(
  conn: &Connection,
  path: &str,
  from: i64,
  to: i64,
) -> rusqlite::Result<Vec<RawChange>> {
  conn
    .prepare_cached(
      "SELECT kind, revNo, filePath, data FROM change
       WHERE filePath = ?1 AND revNo <= ?2 AND revNo >= ?3
       ORDER BY chIdx ASC",
    )?
    .query_map(params![path, to, from], raw_change)?
    .collect()
}

pub fn select_revision_changes(conn: &Connection, revision: i64) -> rusqlite::Result<Vec<RawChange>> {
  conn
    .prepare_cached(
      "SELECT kind, revNo, filePath, data FROM change WHERE revNo = ?1
       ORDER BY filePath ASC, chIdx ASC",
    )?
    .query_map([revision], raw_change)?
    .collect()
}

/// Paths whose newest record at or before `revision` is not a removal.
pub fn select_existing_paths(conn: &Connection, revision: i64) -> rusqlite::Result<Vec<String>> {
  conn
    .prepare_cached(
      "SELECT c.filePath FROM change c
       JOIN (SELECT filePath, max(chIdx) AS lastIdx FROM change
             WHERE revNo <= ?1 GROUP BY filePath) latest
         ON c.chIdx = latest.lastIdx
       WHERE c.kind != ?2
       ORDER BY c.filePath",
    )?
    .query_map(params![revision, ChangeKind::RemovedFile.code()], |row| row.get(0))?
    .collect()
}

pub fn select_all_paths(conn: &Connection, revision: i64) -> rusqlite::Result<Vec<String>> {
  conn
    .prepare_cached(
      "SELECT DISTINCT filePath FROM change WHERE revNo <= ?1 ORDER BY filePath",
    )?
    .query_map([revision], |row| row.get(0))?
    .collect()
}
