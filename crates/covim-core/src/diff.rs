//! Line-range diffing.
//!
//! The diff is a single-region heuristic rather than an LCS diff: it assumes
//! the edit is localized around the cursor and sends a window of
//! `|change_y|` lines on either side of the cursor line. Edits far from the
//! cursor (a substitution on another line, a batch edit) are not captured
//! by the window and will leave peers out of sync.

use crate::message::BufferPatch;
use serde::{Deserialize, Serialize};

/// The buffer content both sides are believed to agree on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BufferSnapshot {
    lines: Vec<String>,
}

impl BufferSnapshot {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl From<Vec<String>> for BufferSnapshot {
    fn from(lines: Vec<String>) -> Self {
        Self { lines }
    }
}

impl<'a> From<&'a [&'a str]> for BufferSnapshot {
    fn from(lines: &'a [&'a str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// A patch that does not fit the local buffer. The views have diverged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("patch window {start}..{tail} does not fit a buffer of {len} lines")]
    OutOfBounds { start: i64, tail: i64, len: usize },
}

/// Describe how `current` differs from `previous`.
///
/// `cursor_line` is the 1-based line the cursor sits on in `current`.
/// Returns `None` when nothing changed.
pub fn compute_outbound_patch(
    previous: &BufferSnapshot,
    current: &BufferSnapshot,
    cursor_line: usize,
) -> Option<BufferPatch> {
    if current == previous {
        return None;
    }

    let prev_len = previous.len() as i64;
    let cur_len = current.len() as i64;
    let cursor_y = cursor_line as i64 - 1;
    let change_y = cur_len - prev_len;

    let old_y = cursor_y - change_y;
    let change_x = if (0..cur_len).contains(&cursor_y) && (0..prev_len).contains(&old_y) {
        char_len(&current.lines[cursor_y as usize]) - char_len(&previous.lines[old_y as usize])
    } else {
        0
    };

    let start = (cursor_y - change_y.abs()).max(0);
    let end = (cur_len - 1).min(cursor_y + change_y.abs());
    let buffer = if end >= start {
        current.lines[start as usize..=end as usize].to_vec()
    } else {
        Vec::new()
    };

    Some(BufferPatch {
        start,
        end,
        change_y,
        change_x,
        buffer,
        buffer_size: current.len(),
    })
}

/// Splice a received patch into `local`.
///
/// The result is `local[..start] ++ patch.buffer ++ local[end - change_y + 1..]`.
/// A window that falls outside `local` is rejected rather than clamped.
pub fn apply_inbound_patch(
    local: &BufferSnapshot,
    patch: &BufferPatch,
) -> Result<BufferSnapshot, PatchError> {
    let len = local.len() as i64;
    let start = patch.start;
    let tail = patch.end - patch.change_y + 1;

    if start < 0 || start > len || tail < start || tail > len {
        return Err(PatchError::OutOfBounds {
            start,
            tail,
            len: local.len(),
        });
    }

    let (start, tail) = (start as usize, tail as usize);
    let mut lines = Vec::with_capacity(start + patch.buffer.len() + (local.len() - tail));
    lines.extend_from_slice(&local.lines[..start]);
    lines.extend(patch.buffer.iter().cloned());
    lines.extend_from_slice(&local.lines[tail..]);
    Ok(BufferSnapshot { lines })
}

fn char_len(line: &str) -> i64 {
    line.chars().count() as i64
}
