//! Core types for CoVim collaborative editing.
//!
//! This crate provides the protocol primitives: the packet types exchanged
//! with the relay server, the wire framing, and the line-range diff used to
//! ship buffer changes. It performs no I/O.

pub mod codec;
pub mod diff;
mod message;
mod name;

pub use codec::CodecError;
pub use diff::{BufferSnapshot, PatchError, apply_inbound_patch, compute_outbound_patch};
pub use message::{BufferPatch, Cursor, CursorUpdate, Message, Packet, Update, User};
pub use name::{DisplayName, NameParseError};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No link.
    #[default]
    Disconnected,
    /// Link being opened for the first time, or handshake awaiting reply.
    Connecting,
    /// Handshake accepted; edits flow.
    Connected,
    /// Link being reopened against the saved session target.
    Reconnecting,
}

impl ConnectionState {
    /// Whether a link is open or being opened.
    pub fn is_active(self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}
