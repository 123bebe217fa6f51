//! Error types for `revlog-core`.

use thiserror::Error;

use crate::store::HistoryError;

#[derive(Debug, Error)]
pub enum Error {
  /// A stored delta list could not be decoded.
  #[error("malformed delta payload: {0}")]
  Decode(String),

  /// A delta list does not fit the payload's `u32` length prefixes.
  #[error("cannot encode delta payload: {0}")]
  Encode(String),

  /// A delta was replayed while the file did not exist (after a removal and
  /// before a new full record).
  #[error("cannot replay delta for {path:?} at revision {revision}: file has no base content")]
  Replay { path: String, revision: i64 },
}

impl HistoryError for Error {
  fn is_corrupt_data(&self) -> bool {
    match self {
      Self::Decode(_) | Self::Replay { .. } => true,
      Self::Encode(_) => false,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
