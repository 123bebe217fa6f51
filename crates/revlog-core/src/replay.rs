//! Reconstruction of file content from stored change records.
//!
//! Reconstruction is two-phase. [`find_base`] walks a file's history from the
//! target revision backwards until it meets a full record (a replay
//! checkpoint). [`replay`] then applies every record from that checkpoint's
//! revision up to the target, in insertion order.

use tracing::{debug, warn};

use crate::{
  Error, Result,
  change::{Change, ChangeKind, ChangeRecord},
  delta::apply_all,
};

/// Outcome of the backwards scan for a replay checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
  /// Replay starts at this revision.
  Found(i64),
  /// The file has no history at or before the target, or its newest record is
  /// a removal.
  Absent,
  /// Only deltas remain; the full record they depended on was deleted.
  Orphaned,
}

/// The reconstructed content of a file plus the number of records replayed to
/// produce it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconstruction {
  pub content:          Option<Vec<u8>>,
  pub records_replayed: usize,
}

/// Scan `(revision, kind)` pairs, newest first, for the replay checkpoint.
///
/// A removal met before any full record means the file does not exist when
/// the removal is the newest record; otherwise deltas follow a removal with no
/// new base, which is an error.
pub fn find_base<I>(path: &str, newest_first: I) -> Result<Base>
where
  I: IntoIterator<Item = (i64, ChangeKind)>,
{
  let mut newer_delta: Option<i64> = None;

  for (revision, kind) in newest_first {
    match kind {
      ChangeKind::NewFile | ChangeKind::ChangeFull => return Ok(Base::Found(revision)),
      ChangeKind::RemovedFile => {
        return match newer_delta {
          None => Ok(Base::Absent),
          Some(revision) => Err(Error::Replay { path: path.to_owned(), revision }),
        };
      }
      ChangeKind::ChangeDelta => {
        newer_delta = Some(revision);
      }
      ChangeKind::NoChange => {}
    }
  }

  match newer_delta {
    None => Ok(Base::Absent),
    Some(revision) => {
      warn!(path, revision, "deltas have no full record to replay from");
      Ok(Base::Orphaned)
    }
  }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
  Unseeded,
  Present,
  Removed,
}

/// Replay `records` (in insertion order) into file content.
///
/// Deltas that precede the first full record are superseded by it and are
/// skipped. A delta after a removal, with no new full record in between, is
/// an error.
pub fn replay<I>(path: &str, records: I) -> Result<Reconstruction>
where
  I: IntoIterator<Item = ChangeRecord>,
{
  let mut buf = Vec::new();
  let mut state = State::Unseeded;
  let mut records_replayed = 0;

  for record in records {
    records_replayed += 1;
    match record.change {
      Change::NewFile(content) | Change::ChangeFull(content) => {
        buf = content;
        state = State::Present;
      }
      Change::RemovedFile => {
        buf.clear();
        state = State::Removed;
      }
      Change::ChangeDelta(deltas) => match state {
        State::Present => apply_all(&mut buf, &deltas),
        State::Unseeded => {}
        State::Removed => {
          return Err(Error::Replay {
            path:     path.to_owned(),
            revision: record.revision_number,
          });
        }
      },
      Change::NoChange => {}
    }
  }

  debug!(path, records_replayed, "replayed file history");

  let content = (state == State::Present).then_some(buf);
  Ok(Reconstruction { content, records_replayed })
}
