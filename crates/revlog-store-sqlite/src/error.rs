//! Error type for `revlog-store-sqlite`.

use std::path::PathBuf;

use revlog_core::store::HistoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] revlog_core::Error),

  #[error("failed to open revision store at {path:?}: {source}")]
  Open {
    path:   PathBuf,
    #[source]
    source: rusqlite::Error,
  },

  /// The file is a SQLite database but holds no revision store version.
  #[error("{0:?} is not a revision store")]
  NotAStore(PathBuf),

  #[error("unsupported revision store version {found} (supported: {supported})")]
  UnsupportedVersion { found: i64, supported: i64 },

  #[error("query failed ({context}): {source}")]
  Query {
    context: String,
    #[source]
    source:  rusqlite::Error,
  },

  #[error("transaction failed ({context}): {source}")]
  Transaction {
    context: String,
    #[source]
    source:  rusqlite::Error,
  },

  /// A stored blob could not be compressed, decompressed or decoded.
  #[error("serialization failed: {0}")]
  Serialization(String),

  #[error("unknown change kind {0} in change table")]
  UnknownChangeKind(i64),

  #[error("revision not found: {0}")]
  RevisionNotFound(i64),

  /// A rollback failed; the handle must be dropped and the store reopened.
  #[error("revision store must be reopened after a failed rollback")]
  Poisoned,
}

impl HistoryError for Error {
  fn is_corrupt_data(&self) -> bool {
    match self {
      Self::Core(err) => err.is_corrupt_data(),
      Self::Serialization(_) | Self::UnknownChangeKind(_) => true,
      _ => false,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Attach context to raw driver errors from the query layer.
pub(crate) trait QueryContext<T> {
  fn with_context<F: FnOnce() -> String>(self, context: F) -> Result<T>;
}

impl<T> QueryContext<T> for rusqlite::Result<T> {
  fn with_context<F: FnOnce() -> String>(self, context: F) -> Result<T> {
    self.map_err(|source| Error::Query { context: context(), source })
  }
}
