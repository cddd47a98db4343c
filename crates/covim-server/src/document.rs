//! The shared document and its collaborators.

use covim_core::{
    BufferPatch, BufferSnapshot, Cursor, CursorUpdate, DisplayName, Update, User,
    apply_inbound_patch,
};

/// Why a name was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    Invalid,
    Taken,
}

/// Authoritative buffer plus everyone editing it.
pub struct Document {
    buffer: BufferSnapshot,
    users: Vec<User>,
}

impl Document {
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            buffer: BufferSnapshot::new(lines),
            users: Vec::new(),
        }
    }

    pub fn lines(&self) -> &[String] {
        self.buffer.lines()
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// Register a collaborator at the top of the document.
    pub fn join(&mut self, name: &str) -> Result<User, JoinError> {
        let name: DisplayName = name.parse().map_err(|_| JoinError::Invalid)?;
        if self.users.iter().any(|u| u.name == name.as_str()) {
            return Err(JoinError::Taken);
        }
        let user = User {
            name: name.into(),
            cursor: Cursor::default(),
        };
        self.users.push(user.clone());
        Ok(user)
    }

    pub fn leave(&mut self, name: &str) -> bool {
        let before = self.users.len();
        self.users.retain(|u| u.name != name);
        self.users.len() != before
    }

    /// Apply an update from `name` and produce the update to relay.
    ///
    /// The relayed update carries every collaborator's cursor after the
    /// change. A patch that does not fit the document is logged and left out
    /// of the relay.
    pub fn apply_update(&mut self, name: &str, mut update: Update) -> Update {
        update.name = name.to_string();

        if let Some(patch) = update.buffer.take() {
            match apply_inbound_patch(&self.buffer, &patch) {
                Ok(next) => {
                    self.buffer = next;
                    self.shift_cursors(name, update.cursor, &patch);
                    update.buffer = Some(patch);
                }
                Err(e) => tracing::warn!(from = %name, "dropping patch: {}", e),
            }
        }

        if let Some(user) = self.users.iter_mut().find(|u| u.name == name) {
            user.cursor = update.cursor;
        }

        update.updated_cursors = Some(
            self.users
                .iter()
                .map(|u| CursorUpdate {
                    name: u.name.clone(),
                    cursor: u.cursor,
                })
                .collect(),
        );
        update
    }

    /// Move other collaborators' cursors out of the way of an edit made at
    /// `at` by `name`.
    fn shift_cursors(&mut self, name: &str, at: Cursor, patch: &BufferPatch) {
        // Line the sender was on before the edit.
        let origin = at.y as i64 - patch.change_y.max(0);

        for user in self.users.iter_mut().filter(|u| u.name != name) {
            let y = user.cursor.y as i64;
            if patch.change_y != 0 && y > origin {
                user.cursor.y = (y + patch.change_y).max(1) as usize;
            } else if patch.change_y == 0 && y == at.y as i64 && user.cursor.x > at.x {
                user.cursor.x = (user.cursor.x as i64 + patch.change_x).max(1) as usize;
            }
        }
    }
}
