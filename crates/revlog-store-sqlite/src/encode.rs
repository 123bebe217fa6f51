//! Encoding and decoding helpers between core types and the values stored in
//! SQLite columns.
//!
//! Every `data` blob is zstd-compressed. Delta payloads are the core delta
//! list encoding before compression; full payloads are raw file bytes.
//! Removed files carry a compressed empty payload.

use revlog_core::{
  change::{Change, ChangeKind, ChangeRecord},
  revision::RevisionMetadata,
};

use crate::{Error, Result};

const ZSTD_LEVEL: i32 = 3;

// ─── Blobs ───────────────────────────────────────────────────────────────────

pub fn compress(payload: &[u8]) -> Result<Vec<u8>> {
  zstd::encode_all(payload, ZSTD_LEVEL)
    .map_err(|e| Error::Serialization(format!("compress: {e}")))
}

pub fn decompress(blob: &[u8]) -> Result<Vec<u8>> {
  zstd::decode_all(blob).map_err(|e| Error::Serialization(format!("decompress: {e}")))
}

/// Serialise and compress a change for the `data` column.
pub fn encode_change(change: &Change) -> Result<Vec<u8>> { compress(&change.to_payload()?) }

// ─── ChangeKind ──────────────────────────────────────────────────────────────

pub fn decode_kind(code: i64) -> Result<ChangeKind> {
  ChangeKind::from_code(code).ok_or(Error::UnknownChangeKind(code))
}

// ─── Raw rows ────────────────────────────────────────────────────────────────

/// Values read directly from a `change` row.
pub struct RawChange {
  pub revision:  i64,
  pub kind:      i64,
  pub file_path: String,
  /// NULL is read as an empty payload.
  pub data:      Option<Vec<u8>>,
}

impl RawChange {
  pub fn into_record(self) -> Result<ChangeRecord> {
    let kind = decode_kind(self.kind)?;
    let change = match kind {
      ChangeKind::NoChange => Change::NoChange,
      ChangeKind::RemovedFile => Change::RemovedFile,
      _ => {
        let payload = match self.data.as_deref() {
          None | Some([]) => Vec::new(),
          Some(blob) => decompress(blob).map_err(|e| self.context(e))?,
        };
        Change::from_payload(kind, payload).map_err(|e| self.context(e.into()))?
      }
    };

    Ok(ChangeRecord {
      revision_number: self.revision,
      file_path: self.file_path,
      change,
    })
  }

  fn context(&self, error: Error) -> Error {
    let detail = match error {
      Error::Serialization(msg) => msg,
      Error::Core(core) => core.to_string(),
      other => other.to_string(),
    };
    Error::Serialization(format!(
      "{} at revision {}: {detail}",
      self.file_path, self.revision
    ))
  }
}

/// Values read directly from a `revision` row.
pub struct RawRevision {
  pub revision_no:        i64,
  pub parent_revision_no: Option<i64>,
  pub working_dir:        Option<String>,
  pub timestamp:          Option<i64>,
}

impl RawRevision {
  pub fn into_metadata(self, startup_files: Vec<String>) -> RevisionMetadata {
    RevisionMetadata {
      revision_no: self.revision_no,
      parent_revision_no: self.parent_revision_no,
      working_dir: self.working_dir,
      timestamp: self.timestamp.unwrap_or_default(),
      startup_files,
    }
  }
}

#[cfg(test)]
mod tests {
  use revlog_core::delta::TextDelta;

  use super::*;

  #[test]
  fn blobs_are_compressed() {
    let payload = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    let blob = compress(payload).unwrap();
    assert!(blob.len() < payload.len());
    assert_eq!(decompress(&blob).unwrap(), payload);
  }

  #[test]
  fn raw_delta_row_decodes() {
    let change = Change::ChangeDelta(vec![TextDelta::insert(3, "x")]);
    let raw = RawChange {
      revision:  7,
      kind:      ChangeKind::ChangeDelta.code(),
      file_path: "a.txt".into(),
      data:      Some(encode_change(&change).unwrap()),
    };
    let record = raw.into_record().unwrap();
    assert_eq!(record.revision_number, 7);
    assert_eq!(record.change, change);
  }

  #[test]
  fn unknown_kind_is_rejected() {
    let raw = RawChange { revision: 1, kind: 9, file_path: "a".into(), data: None };
    assert!(matches!(raw.into_record(), Err(Error::UnknownChangeKind(9))));
  }

  #[test]
  fn corrupt_blob_names_file_and_revision() {
    let raw = RawChange {
      revision:  4,
      kind:      ChangeKind::ChangeFull.code(),
      file_path: "b.txt".into(),
      data:      Some(b"not zstd".to_vec()),
    };
    match raw.into_record() {
      Err(Error::Serialization(msg)) => {
        assert!(msg.contains("b.txt"));
        assert!(msg.contains("revision 4"));
      }
      other => panic!("expected serialization error, got {other:?}"),
    }
  }

  #[test]
  fn null_full_payload_is_empty_file() {
    let raw = RawChange {
      revision:  1,
      kind:      ChangeKind::NewFile.code(),
      file_path: "empty".into(),
      data:      None,
    };
    assert_eq!(raw.into_record().unwrap().change, Change::NewFile(Vec::new()));
  }
}
