//! Session identifiers for the relayed transport.
//!
//! A session id is a short, human-typeable token. The host generates one when
//! it opens a relayed session; the remote types it in (or receives it in a
//! link) to join. The id stays the same across reconnects.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of ids produced by [`SessionId::generate`].
pub const GENERATED_LEN: usize = 6;

/// Longest id accepted from the outside.
pub const MAX_LEN: usize = 64;

/// Identifier of a relayed session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random id (6 lowercase base-36 characters).
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..GENERATED_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    /// The id as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = SessionIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(SessionIdParseError::Empty);
        }
        if s.len() > MAX_LEN {
            return Err(SessionIdParseError::TooLong(s.len()));
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(SessionIdParseError::InvalidChar(c));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for SessionId {
    type Error = SessionIdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

/// Error parsing a session id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionIdParseError {
    #[error("session id cannot be empty")]
    Empty,
    #[error("session id is {0} characters long (max {MAX_LEN})")]
    TooLong(usize),
    #[error("session id contains invalid character {0:?}")]
    InvalidChar(char),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_typeable() {
        let id = SessionId::generate();
        assert_eq!(id.as_str().len(), GENERATED_LEN);
        assert!(
            id.as_str()
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
        );
        let reparsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(reparsed, id);
    }

    #[test]
    fn surrounding_whitespace_is_not_part_of_an_id() {
        assert_eq!(
            " ab12cd".parse::<SessionId>(),
            Err(SessionIdParseError::InvalidChar(' '))
        );
        assert_eq!(
            "ab12cd\n".parse::<SessionId>(),
            Err(SessionIdParseError::InvalidChar('\n'))
        );
    }

    #[test]
    fn rejects_bad_ids() {
        assert_eq!("".parse::<SessionId>(), Err(SessionIdParseError::Empty));
        assert_eq!(
            "ab/cd".parse::<SessionId>(),
            Err(SessionIdParseError::InvalidChar('/'))
        );
        let long = "a".repeat(MAX_LEN + 1);
        assert_eq!(
            long.parse::<SessionId>(),
            Err(SessionIdParseError::TooLong(MAX_LEN + 1))
        );
    }

    #[test]
    fn serializes_as_plain_string() {
        let id: SessionId = "ab12cd".parse().unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""ab12cd""#);
        let back: SessionId = serde_json::from_str(r#""ab12cd""#).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<SessionId>(r#""a b""#).is_err());
    }
}
