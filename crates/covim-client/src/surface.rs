//! The editing surface.
//!
//! The host editor implements [`EditorSurface`]. All of its methods are
//! called from the thread that owns the [`Client`](crate::Client), never from
//! the network worker.

use crate::roster::{Collaborator, CollaboratorRegistry};
use covim_core::Cursor;

/// Buffer, cursor and display hooks of the host editor.
pub trait EditorSurface {
    /// The visible buffer, one entry per line.
    fn buffer_lines(&self) -> Vec<String>;

    /// Replace the whole visible buffer.
    fn replace_buffer(&mut self, lines: &[String]);

    /// The local cursor: 1-based column and line.
    fn cursor(&self) -> Cursor;

    /// Move the local cursor.
    fn set_cursor(&mut self, cursor: Cursor);

    /// Show a one-line message to the user.
    fn notify(&mut self, message: &str);

    /// Prepare the collaborator list view. Called once the server accepts
    /// the handshake.
    fn open_roster_view(&mut self) {}

    /// Tear down the collaborator list view.
    fn close_roster_view(&mut self) {}

    /// The roster gained or lost an entry.
    fn roster_changed(&mut self, _roster: &CollaboratorRegistry) {}

    /// Draw (or move) a remote collaborator's cursor mark.
    fn show_cursor(&mut self, _collaborator: &Collaborator) {}

    /// Remove a remote collaborator's cursor mark.
    fn hide_cursor(&mut self, _collaborator: &Collaborator) {}

    fn redraw(&mut self) {}
}
