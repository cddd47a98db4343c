//! Protocol packets.
//!
//! Every frame after the name handshake is one JSON object of the form
//! `{"packet_type": ..., "data": {...}}`. Roster and session messages use
//! `packet_type = "message"` and are discriminated by `data.message_type`;
//! edits and cursor motion use `packet_type = "update"`.

use serde::{Deserialize, Serialize};

/// One protocol packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "packet_type", content = "data", rename_all = "snake_case")]
pub enum Packet {
    /// Session and roster notifications (server to client).
    Message(Message),
    /// Buffer patch and/or cursor motion (both directions).
    Update(Update),
}

/// Session and roster notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum Message {
    /// The requested name is already used by another collaborator.
    ErrorNewnameTaken,
    /// The requested name contains illegal characters.
    ErrorNewnameInvalid,
    /// The handshake was accepted.
    ConnectSuccess {
        /// Everyone currently in the document, including the new user.
        collaborators: Vec<User>,
        /// The document as the server has it, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        buffer: Option<Vec<String>>,
    },
    /// Another collaborator joined.
    UserConnected { user: User },
    /// A collaborator left.
    UserDisconnected { name: String },
}

/// An edit and/or cursor motion from one collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// Originating collaborator.
    pub name: String,
    /// Sender's cursor after the change.
    pub cursor: Cursor,
    /// Line-range replacement, present only when the buffer changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer: Option<BufferPatch>,
    /// Cursor positions recomputed by the server after applying the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_cursors: Option<Vec<CursorUpdate>>,
}

impl Update {
    /// A cursor-only update.
    pub fn cursor(name: impl Into<String>, cursor: Cursor) -> Self {
        Self {
            name: name.into(),
            cursor,
            buffer: None,
            updated_cursors: None,
        }
    }

    /// Attach a buffer patch.
    pub fn with_patch(mut self, patch: Option<BufferPatch>) -> Self {
        self.buffer = patch;
        self
    }
}

/// A roster entry as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    #[serde(default)]
    pub cursor: Cursor,
}

/// A collaborator's recomputed cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorUpdate {
    pub name: String,
    pub cursor: Cursor,
}

/// A cursor position: 1-based column `x`, 1-based line `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor {
    pub x: usize,
    pub y: usize,
}

impl Cursor {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Clamp to a reportable position (`x >= 1`).
    pub fn clamped(self) -> Self {
        Self {
            x: self.x.max(1),
            y: self.y,
        }
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self { x: 1, y: 1 }
    }
}

/// A line-range replacement describing one side's buffer delta.
///
/// Indices are signed on the wire: `end` is `-1` when the sender's buffer is
/// empty, and the deltas are negative for deletions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferPatch {
    /// First affected line (0-based, inclusive) in the sender's new buffer.
    pub start: i64,
    /// Last affected line (0-based, inclusive) in the sender's new buffer.
    pub end: i64,
    /// Net line-count delta.
    pub change_y: i64,
    /// Net character delta on the cursor line (single-line edits only).
    pub change_x: i64,
    /// Replacement lines for `start..=end`.
    pub buffer: Vec<String>,
    /// Sender's total line count after the edit. Advisory.
    pub buffer_size: usize,
}
