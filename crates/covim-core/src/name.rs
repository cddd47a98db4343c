//! Collaborator display names.
//!
//! A name is the stable identity of a collaborator within a document. It is
//! sent verbatim as the connection handshake, so it is restricted to
//! characters that survive any transport: ASCII letters, digits, `_` and `-`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A validated collaborator name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DisplayName(String);

impl DisplayName {
    /// The name as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether `c` may appear in a name.
    pub fn is_allowed_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_' || c == '-'
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DisplayName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for DisplayName {
    type Err = NameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(NameParseError::Empty);
        }
        if let Some(c) = s.chars().find(|c| !Self::is_allowed_char(*c)) {
            return Err(NameParseError::IllegalCharacter(c));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for DisplayName {
    type Error = NameParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DisplayName> for String {
    fn from(name: DisplayName) -> Self {
        name.0
    }
}

/// Error parsing a display name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameParseError {
    #[error("name cannot be empty")]
    Empty,
    #[error("name contains illegal character {0:?}; only letters, numbers, underscores and dashes are allowed")]
    IllegalCharacter(char),
}
