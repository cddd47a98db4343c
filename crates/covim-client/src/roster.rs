//! Collaborator registry.
//!
//! Tracks who is in the document, where their cursor is, and which palette
//! slot they are drawn with. Slots are assigned locally and never sent over
//! the wire, so two peers may draw the same collaborator differently.

use covim_core::{Cursor, User};
use indexmap::IndexMap;

/// Number of colors in the peer palette.
pub const PEER_PALETTE_SIZE: u32 = 11;

/// Display id reserved for the local user.
pub const LOCAL_DISPLAY_ID: u32 = 4000;

const FIRST_PEER_ID: u32 = 4;

/// Palette slot a collaborator is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSlot {
    /// The reserved slot for the local user.
    Local,
    /// A slot in the cyclic peer palette, `0..PEER_PALETTE_SIZE`.
    Peer(u32),
}

impl ColorSlot {
    /// Highlight group name used by editor integrations.
    pub fn highlight_group(self) -> String {
        match self {
            ColorSlot::Local => "CursorUser".to_string(),
            ColorSlot::Peer(n) => format!("Cursor{n}"),
        }
    }
}

/// A known collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collaborator {
    pub name: String,
    pub color: ColorSlot,
    /// Unique within a session; used as the highlight match id.
    pub display_id: u32,
    pub cursor: Cursor,
}

impl Collaborator {
    pub fn is_local(&self) -> bool {
        self.color == ColorSlot::Local
    }
}

/// The roster, in insertion order.
#[derive(Debug, Clone)]
pub struct CollaboratorRegistry {
    local_name: String,
    entries: IndexMap<String, Collaborator>,
    next_id: u32,
}

impl CollaboratorRegistry {
    pub fn new(local_name: impl Into<String>) -> Self {
        Self {
            local_name: local_name.into(),
            entries: IndexMap::new(),
            next_id: FIRST_PEER_ID,
        }
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Change the local identity. Existing entries are kept.
    pub fn set_local_name(&mut self, name: impl Into<String>) {
        self.local_name = name.into();
    }

    /// Add a collaborator from a roster entry.
    ///
    /// A name already present keeps its slot and id; only its cursor is
    /// refreshed.
    pub fn add_user(&mut self, user: &User) -> &Collaborator {
        if self.entries.contains_key(&user.name) {
            let entry = &mut self.entries[&user.name];
            entry.cursor = user.cursor;
            return entry;
        }

        let (color, display_id) = if user.name == self.local_name {
            (ColorSlot::Local, LOCAL_DISPLAY_ID)
        } else {
            let id = self.next_id;
            self.next_id += 1;
            (ColorSlot::Peer((id - 3) % PEER_PALETTE_SIZE), id)
        };

        self.entries
            .entry(user.name.clone())
            .or_insert(Collaborator {
                name: user.name.clone(),
                color,
                display_id,
                cursor: user.cursor,
            })
    }

    /// Remove a collaborator. Unknown names are ignored.
    pub fn remove_user(&mut self, name: &str) -> Option<Collaborator> {
        self.entries.shift_remove(name)
    }

    /// Overwrite a collaborator's cursor.
    pub fn update_cursor(&mut self, name: &str, cursor: Cursor) -> Option<&Collaborator> {
        let entry = self.entries.get_mut(name)?;
        entry.cursor = cursor;
        Some(entry)
    }

    pub fn get(&self, name: &str) -> Option<&Collaborator> {
        self.entries.get(name)
    }

    /// Collaborators in the order they were added.
    pub fn iter(&self) -> impl Iterator<Item = &Collaborator> {
        self.entries.values()
    }

    /// Names in the order they were added.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry, returning them. Display ids keep counting so they
    /// are never reused within a session.
    pub fn clear(&mut self) -> Vec<Collaborator> {
        self.entries.drain(..).map(|(_, c)| c).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> User {
        User {
            name: name.to_string(),
            cursor: Cursor::default(),
        }
    }

    #[test]
    fn local_user_gets_reserved_slot() {
        let mut roster = CollaboratorRegistry::new("me");
        let me = roster.add_user(&user("me")).clone();
        assert_eq!(me.color, ColorSlot::Local);
        assert_eq!(me.display_id, LOCAL_DISPLAY_ID);
        assert!(me.is_local());

        let peer = roster.add_user(&user("peer")).clone();
        assert_eq!(peer.color, ColorSlot::Peer(1));
        assert_eq!(peer.display_id, 4);
    }

    #[test]
    fn palette_cycles_every_eleven_peers() {
        let mut roster = CollaboratorRegistry::new("me");
        let added: Vec<Collaborator> = (0..12)
            .map(|i| roster.add_user(&user(&format!("peer{i}"))).clone())
            .collect();

        assert_eq!(added[11].color, added[0].color);
        for (i, a) in added.iter().enumerate() {
            for b in &added[i + 1..] {
                assert_ne!(a.display_id, b.display_id);
            }
        }
        let distinct: std::collections::HashSet<_> = added[..11].iter().map(|c| c.color).collect();
        assert_eq!(distinct.len(), 11);
    }

    #[test]
    fn ids_survive_clear() {
        let mut roster = CollaboratorRegistry::new("me");
        let first = roster.add_user(&user("a")).display_id;
        roster.clear();
        assert!(roster.is_empty());
        let second = roster.add_user(&user("a")).display_id;
        assert_ne!(first, second);
    }

    #[test]
    fn remove_unknown_is_noop() {
        let mut roster = CollaboratorRegistry::new("me");
        roster.add_user(&user("a"));
        assert_eq!(roster.remove_user("ghost"), None);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn insertion_order_is_stable() {
        let mut roster = CollaboratorRegistry::new("me");
        for name in ["zed", "amy", "me", "bob"] {
            roster.add_user(&user(name));
        }
        roster.remove_user("amy");
        roster.add_user(&user("amy"));
        assert_eq!(roster.names().collect::<Vec<_>>(), ["zed", "me", "bob", "amy"]);
    }

    #[test]
    fn re_adding_keeps_identity() {
        let mut roster = CollaboratorRegistry::new("me");
        let first = roster.add_user(&user("a")).clone();
        let moved = User {
            name: "a".into(),
            cursor: Cursor::new(5, 6),
        };
        let again = roster.add_user(&moved).clone();
        assert_eq!(again.display_id, first.display_id);
        assert_eq!(again.cursor, Cursor::new(5, 6));
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn update_cursor_overwrites() {
        let mut roster = CollaboratorRegistry::new("me");
        roster.add_user(&user("a"));
        let updated = roster.update_cursor("a", Cursor::new(9, 2)).unwrap();
        assert_eq!(updated.cursor, Cursor::new(9, 2));
        assert!(roster.update_cursor("ghost", Cursor::new(1, 1)).is_none());
    }

    #[test]
    fn highlight_groups() {
        assert_eq!(ColorSlot::Local.highlight_group(), "CursorUser");
        assert_eq!(ColorSlot::Peer(0).highlight_group(), "Cursor0");
        assert_eq!(ColorSlot::Peer(10).highlight_group(), "Cursor10");
    }
}
