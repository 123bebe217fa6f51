//! Text deltas, the atomic edit unit recorded between two revisions.
//!
//! A delta is either an insertion or a deletion at a byte offset. Deltas are
//! replayed against buffers whose exact size is only approximately known, so
//! every operation clamps out-of-range offsets instead of panicking.

use std::ops::Range;

use bytes::{Buf, BufMut};
use crate::{Error, Result};

/// Trailing byte some editors keep at the end of a document buffer. Clamped
/// deletions never remove it and clamped insertions land before it.
pub const TERMINATOR: u8 = 0;

// ─── TextDelta ───────────────────────────────────────────────────────────────

/// A single-region edit: delete `deleted_count` bytes at `offset`, or insert
/// `inserted_text` at `offset`. A replacement is a delete followed by an
/// insert.
///
/// `sequence_number` records wall-clock ordering for auditing only; replay
/// order is always storage order. It does not take part in equality.
#[derive(Debug, Clone, Default)]
pub struct TextDelta {
  pub offset:          usize,
  pub deleted_count:   usize,
  pub inserted_text:   Vec<u8>,
  pub sequence_number: i64,
}

impl PartialEq for TextDelta {
  fn eq(&self, other: &Self) -> bool {
    self.offset == other.offset
      && self.deleted_count == other.deleted_count
      && self.inserted_text == other.inserted_text
  }
}

impl Eq for TextDelta {}

impl TextDelta {
  pub fn insert(offset: usize, text: impl Into<Vec<u8>>) -> Self {
    Self { offset, inserted_text: text.into(), ..Self::default() }
  }

  pub fn delete(offset: usize, count: usize) -> Self {
    Self { offset, deleted_count: count, ..Self::default() }
  }

  pub fn with_sequence(mut self, sequence_number: i64) -> Self {
    self.sequence_number = sequence_number;
    self
  }

  pub fn is_delete(&self) -> bool { self.deleted_count > 0 }

  pub fn is_insert(&self) -> bool {
    !self.is_delete() && !self.inserted_text.is_empty()
  }

  /// Apply the edit to a complete document buffer.
  pub fn apply_to_buffer(&self, buf: &mut Vec<u8>) {
    let end = content_len(buf);
    if self.is_delete() {
      let start = self.offset.min(end);
      let stop = self.offset.saturating_add(self.deleted_count).min(end);
      buf.drain(start..stop);
    } else if !self.inserted_text.is_empty() {
      let at = self.offset.min(end);
      buf.splice(at..at, self.inserted_text.iter().copied());
    }
  }

  /// Adjust a well-formed `[start, end)` interval so it keeps covering the
  /// same text after this edit.
  pub fn apply_to_range(&self, range: &mut Range<usize>) {
    if self.offset > range.end {
      return;
    }
    if self.is_delete() {
      if self.offset < range.start {
        range.start = range
          .start
          .saturating_sub(self.deleted_count)
          .max(self.offset);
      }
      range.end = range.end.saturating_sub(self.deleted_count).max(self.offset);
    } else {
      let len = self.inserted_text.len();
      if self.offset < range.start {
        range.start += len;
      }
      range.end += len;
    }
  }

  /// Map a cursor position through this edit.
  pub fn apply_to_position(&self, pos: usize) -> usize {
    if pos < self.offset {
      pos
    } else if self.is_delete() {
      pos.saturating_sub(self.deleted_count).max(self.offset)
    } else {
      pos + self.inserted_text.len()
    }
  }

  /// Apply the edit to `buf`, which holds only the `section` slice of a
  /// larger document. `section` is updated to its new location.
  ///
  /// Deletions straddling a section boundary move the boundary for the part
  /// outside the section and erase the part inside it.
  pub fn apply_to_partial_buffer(&self, buf: &mut Vec<u8>, section: &mut Range<usize>) {
    if self.offset > section.end {
      return;
    }
    if self.is_delete() {
      let del_end = self.offset.saturating_add(self.deleted_count);
      let before = del_end.min(section.start).saturating_sub(self.offset);
      let inside_start = self.offset.max(section.start);
      let inside_end = del_end.min(section.end);
      let inside = inside_end.saturating_sub(inside_start);
      if inside > 0 {
        let local_start = (inside_start - section.start).min(buf.len());
        let local_end = (inside_end - section.start).min(buf.len());
        buf.drain(local_start..local_end);
      }
      section.start -= before;
      section.end -= before + inside;
    } else if !self.inserted_text.is_empty() {
      let len = self.inserted_text.len();
      if self.offset < section.start {
        section.start += len;
      } else {
        let at = (self.offset - section.start).min(buf.len());
        buf.splice(at..at, self.inserted_text.iter().copied());
      }
      section.end += len;
    }
  }

  // ── Serialisation ─────────────────────────────────────────────────────────

  /// Encode a delta list into the stored payload format: a big-endian `u32`
  /// count followed by `(text_len: u32, text, offset: u64, deleted: u64,
  /// sequence: i64)` per delta. Fails if the list or any inserted text is
  /// longer than `u32::MAX`.
  pub fn encode_list(deltas: &[TextDelta]) -> Result<Vec<u8>> {
    let size = 4 + deltas
      .iter()
      .map(|d| 4 + d.inserted_text.len() + 24)
      .sum::<usize>();
    let mut out = Vec::with_capacity(size);
    out.put_u32(length_prefix(deltas.len(), "delta count")?);
    for delta in deltas {
      out.put_u32(length_prefix(delta.inserted_text.len(), "inserted text")?);
      out.put_slice(&delta.inserted_text);
      out.put_u64(delta.offset as u64);
      out.put_u64(delta.deleted_count as u64);
      out.put_i64(delta.sequence_number);
    }
    Ok(out)
  }

  /// Decode a payload produced by [`TextDelta::encode_list`].
  pub fn decode_list(mut buf: &[u8]) -> Result<Vec<TextDelta>> {
    let count = take_u32(&mut buf, "delta count")?;
    let mut deltas = Vec::with_capacity((count as usize).min(1024));

    for index in 0..count {
      let text_len = take_u32(&mut buf, "text length")? as usize;
      if buf.remaining() < text_len {
        return Err(Error::Decode(format!(
          "delta {index}: text length {text_len} exceeds remaining {} bytes",
          buf.remaining()
        )));
      }
      let inserted_text = buf[..text_len].to_vec();
      buf.advance(text_len);

      let offset = take_usize(&mut buf, "offset")?;
      let deleted_count = take_usize(&mut buf, "deleted count")?;
      if buf.remaining() < 8 {
        return Err(Error::Decode(format!("delta {index}: truncated sequence number")));
      }
      let sequence_number = buf.get_i64();

      deltas.push(TextDelta { offset, deleted_count, inserted_text, sequence_number });
    }

    if buf.has_remaining() {
      return Err(Error::Decode(format!(
        "{} trailing bytes after {count} deltas",
        buf.remaining()
      )));
    }
    Ok(deltas)
  }
}

/// Apply `deltas` to `buf` in order.
pub fn apply_all(buf: &mut Vec<u8>, deltas: &[TextDelta]) {
  for delta in deltas {
    delta.apply_to_buffer(buf);
  }
}

fn content_len(buf: &[u8]) -> usize {
  match buf.last() {
    Some(&TERMINATOR) => buf.len() - 1,
    _ => buf.len(),
  }
}

fn length_prefix(len: usize, what: &str) -> Result<u32> {
  u32::try_from(len).map_err(|_| Error::Encode(format!("{what} of {len} exceeds u32::MAX")))
}

fn take_u32(buf: &mut &[u8], what: &str) -> Result<u32> {
  if buf.remaining() < 4 {
    return Err(Error::Decode(format!("truncated {what}")));
  }
  Ok(buf.get_u32())
}

fn take_usize(buf: &mut &[u8], what: &str) -> Result<usize> {
  if buf.remaining() < 8 {
    return Err(Error::Decode(format!("truncated {what}")));
  }
  let value = buf.get_u64();
  usize::try_from(value).map_err(|_| Error::Decode(format!("{what} {value} out of range")))
}
