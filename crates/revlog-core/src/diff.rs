//! Line-oriented diffing that produces [`TextDelta`]s.
//!
//! The diff runs over lines (Myers algorithm) and is then lowered to byte
//! offsets, so applying the returned deltas in order to `old` yields `new`
//! exactly.

use similar::{Algorithm, DiffTag, capture_diff_slices};

use crate::delta::TextDelta;

/// Compute the deltas that turn `old` into `new`.
pub fn diff_buffers(old: &[u8], new: &[u8]) -> Vec<TextDelta> {
  if old == new {
    return Vec::new();
  }
  if old.is_empty() {
    return vec![TextDelta::insert(0, new)];
  }

  let old_lines: Vec<&[u8]> = old.split_inclusive(|&b| b == b'\n').collect();
  let new_lines: Vec<&[u8]> = new.split_inclusive(|&b| b == b'\n').collect();

  let mut deltas = Vec::new();
  // Offset into the buffer as it looks after the deltas emitted so far.
  let mut pos = 0usize;

  for op in capture_diff_slices(Algorithm::Myers, &old_lines, &new_lines) {
    let (tag, old_range, new_range) = op.as_tag_tuple();
    match tag {
      DiffTag::Equal => {
        pos += byte_len(&old_lines[old_range]);
      }
      DiffTag::Delete => {
        deltas.push(TextDelta::delete(pos, byte_len(&old_lines[old_range])));
      }
      DiffTag::Insert => {
        let text = new_lines[new_range].concat();
        let at = pos;
        pos += text.len();
        deltas.push(TextDelta::insert(at, text));
      }
      DiffTag::Replace => {
        deltas.push(TextDelta::delete(pos, byte_len(&old_lines[old_range])));
        let text = new_lines[new_range].concat();
        let at = pos;
        pos += text.len();
        deltas.push(TextDelta::insert(at, text));
      }
    }
  }

  deltas
}

fn byte_len(lines: &[&[u8]]) -> usize { lines.iter().map(|l| l.len()).sum() }
