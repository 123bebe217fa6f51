//! Change records: what happened to one file within one revision.
//!
//! The set of change kinds is closed. Each kind has a stable integer code
//! that is part of the on-disk format and must never be renumbered.

use crate::{Result, delta::TextDelta};

// ─── ChangeKind ──────────────────────────────────────────────────────────────

/// Discriminant of a [`Change`], stored in the `kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
  NoChange,
  NewFile,
  RemovedFile,
  ChangeDelta,
  ChangeFull,
}

impl ChangeKind {
  /// The integer stored in the database.
  pub fn code(self) -> i64 {
    match self {
      Self::NoChange => 0,
      Self::NewFile => 1,
      Self::RemovedFile => 2,
      Self::ChangeDelta => 3,
      Self::ChangeFull => 4,
    }
  }

  pub fn from_code(code: i64) -> Option<Self> {
    match code {
      0 => Some(Self::NoChange),
      1 => Some(Self::NewFile),
      2 => Some(Self::RemovedFile),
      3 => Some(Self::ChangeDelta),
      4 => Some(Self::ChangeFull),
      _ => None,
    }
  }

  /// Full records carry complete file content and act as replay checkpoints.
  pub fn is_full(self) -> bool { matches!(self, Self::NewFile | Self::ChangeFull) }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::NoChange => "no_change",
      Self::NewFile => "new_file",
      Self::RemovedFile => "removed_file",
      Self::ChangeDelta => "change_delta",
      Self::ChangeFull => "change_full",
    }
  }
}

// ─── Change ──────────────────────────────────────────────────────────────────

/// The payload of a change record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
  /// Nothing changed. Never persisted.
  NoChange,
  NewFile(Vec<u8>),
  RemovedFile,
  ChangeFull(Vec<u8>),
  /// Ordered edits relative to the file's content at the previous record.
  ChangeDelta(Vec<TextDelta>),
}

impl Change {
  pub fn kind(&self) -> ChangeKind {
    match self {
      Self::NoChange => ChangeKind::NoChange,
      Self::NewFile(_) => ChangeKind::NewFile,
      Self::RemovedFile => ChangeKind::RemovedFile,
      Self::ChangeFull(_) => ChangeKind::ChangeFull,
      Self::ChangeDelta(_) => ChangeKind::ChangeDelta,
    }
  }

  /// Serialise the payload (uncompressed) for the `data` column.
  pub fn to_payload(&self) -> Result<Vec<u8>> {
    Ok(match self {
      Self::NoChange | Self::RemovedFile => Vec::new(),
      Self::NewFile(bytes) | Self::ChangeFull(bytes) => bytes.clone(),
      Self::ChangeDelta(deltas) => TextDelta::encode_list(deltas)?,
    })
  }

  /// Rebuild a change from its kind and uncompressed payload.
  pub fn from_payload(kind: ChangeKind, payload: Vec<u8>) -> Result<Self> {
    Ok(match kind {
      ChangeKind::NoChange => Self::NoChange,
      ChangeKind::NewFile => Self::NewFile(payload),
      ChangeKind::RemovedFile => Self::RemovedFile,
      ChangeKind::ChangeFull => Self::ChangeFull(payload),
      ChangeKind::ChangeDelta => Self::ChangeDelta(TextDelta::decode_list(&payload)?),
    })
  }
}

// ─── ChangeRecord ────────────────────────────────────────────────────────────

/// One file's change within one revision.
///
/// `file_path` is relative to the project root and is a stable key; renames
/// are a removal of the old path plus a new file at the new path.
/// `revision_number` is assigned by the store; records built by callers carry
/// `0` until they are read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
  pub revision_number: i64,
  pub file_path:       String,
  pub change:          Change,
}

impl ChangeRecord {
  pub fn new(file_path: impl Into<String>, change: Change) -> Self {
    Self { revision_number: 0, file_path: file_path.into(), change }
  }

  pub fn new_file(file_path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
    Self::new(file_path, Change::NewFile(content.into()))
  }

  pub fn full(file_path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
    Self::new(file_path, Change::ChangeFull(content.into()))
  }

  pub fn delta(file_path: impl Into<String>, deltas: Vec<TextDelta>) -> Self {
    Self::new(file_path, Change::ChangeDelta(deltas))
  }

  pub fn removed(file_path: impl Into<String>) -> Self {
    Self::new(file_path, Change::RemovedFile)
  }

  pub fn no_change(file_path: impl Into<String>) -> Self {
    Self::new(file_path, Change::NoChange)
  }

  pub fn kind(&self) -> ChangeKind { self.change.kind() }

  pub fn is_full(&self) -> bool { self.kind().is_full() }

  pub fn is_persistable(&self) -> bool { self.kind() != ChangeKind::NoChange }
}
