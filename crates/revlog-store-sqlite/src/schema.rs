//! SQL schema and version migration for the revision store.
//!
//! The schema version lives in the `metadata` table under the `"version"`
//! key. Table and column names, and the integer `kind` encoding, are part of
//! the on-disk format shared with earlier releases.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension as _};
use tracing::{debug, info};

use crate::{Error, Result};

/// The schema version written by this release.
pub const LATEST_VERSION: i64 = 2;

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS revision (
    revNo       INTEGER PRIMARY KEY AUTOINCREMENT,
    parentRevNo INTEGER REFERENCES revision(revNo),
    workingDir  TEXT,
    timestamp   INTEGER
);

CREATE TABLE IF NOT EXISTS startupFile (
    idx      INTEGER PRIMARY KEY AUTOINCREMENT,
    revNo    INTEGER,
    filePath TEXT,
    UNIQUE (revNo, filePath),
    FOREIGN KEY (revNo) REFERENCES revision(revNo) ON DELETE CASCADE ON UPDATE CASCADE
);

-- kind: 0 no change, 1 new file, 2 removed file, 3 delta, 4 full content.
-- data: zstd-compressed payload.
CREATE TABLE IF NOT EXISTS change (
    chIdx    INTEGER PRIMARY KEY AUTOINCREMENT,
    kind     INTEGER,
    revNo    INTEGER,
    filePath TEXT,
    data     BLOB,
    FOREIGN KEY (revNo) REFERENCES revision(revNo) ON DELETE CASCADE ON UPDATE CASCADE
);

CREATE TABLE IF NOT EXISTS metadata (
    key   TEXT PRIMARY KEY,
    value BLOB
);

CREATE INDEX IF NOT EXISTS change_path_rev_idx ON change(filePath, revNo);
";

/// Version 1 stores had no working directory per revision.
const UPDATE_V1_TO_V2: &str = "ALTER TABLE revision ADD COLUMN workingDir TEXT;";

/// Configure the connection, then create or migrate the schema.
///
/// Returns the version the store was migrated from, if a migration ran.
pub fn initialise(conn: &mut Connection, path: &Path) -> Result<Option<i64>> {
  let open_err = |source| Error::Open { path: path.to_path_buf(), source };

  conn.pragma_update(None, "foreign_keys", true).map_err(open_err)?;
  if path != Path::new(":memory:") {
    let mode: String = conn
      .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
      .map_err(open_err)?;
    debug!(journal_mode = %mode, "configured journal");
  }

  let user_tables: i64 = conn
    .query_row(
      "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
      [],
      |row| row.get(0),
    )
    .map_err(open_err)?;
  let has_metadata: bool = conn
    .query_row(
      "SELECT count(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'metadata'",
      [],
      |row| row.get(0),
    )
    .map_err(open_err)?;
  let version = if has_metadata { read_version(conn).map_err(open_err)? } else { None };

  let migrated_from = match version {
    None if user_tables == 0 => {
      let tx = conn.transaction().map_err(open_err)?;
      tx.execute_batch(CREATE_TABLES).map_err(open_err)?;
      write_version(&tx, LATEST_VERSION).map_err(open_err)?;
      tx.commit().map_err(open_err)?;
      info!(path = %path.display(), version = LATEST_VERSION, "created revision store");
      None
    }
    None => return Err(Error::NotAStore(path.to_path_buf())),
    Some(1) => {
      let tx = conn.transaction().map_err(open_err)?;
      tx.execute_batch(UPDATE_V1_TO_V2).map_err(open_err)?;
      tx.execute_batch(CREATE_TABLES).map_err(open_err)?;
      write_version(&tx, LATEST_VERSION).map_err(open_err)?;
      tx.commit().map_err(open_err)?;
      info!(path = %path.display(), from = 1, to = LATEST_VERSION, "migrated revision store");
      Some(1)
    }
    Some(LATEST_VERSION) => {
      conn.execute_batch(CREATE_TABLES).map_err(open_err)?;
      None
    }
    Some(found) => {
      return Err(Error::UnsupportedVersion { found, supported: LATEST_VERSION });
    }
  };

  Ok(migrated_from)
}

/// The stored schema version, if any.
pub fn read_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
  conn
    .query_row(
      "SELECT value FROM metadata WHERE key = 'version' LIMIT 1",
      [],
      |row| row.get(0),
    )
    .optional()
}

fn write_version(conn: &Connection, version: i64) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT OR REPLACE INTO metadata (key, value) VALUES ('version', ?1)",
    [version],
  )?;
  Ok(())
}
