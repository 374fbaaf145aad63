use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SessionError};

/// Longest id accepted from callers.
pub const MAX_ID_LEN: usize = 128;

/// Opaque session identifier.
///
/// Only ASCII alphanumerics, `-` and `_` are allowed, so an id is always
/// usable as a filename stem and a URL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Validate an id supplied by a caller.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(SessionError::InvalidArgument(
                "session id must not be empty".to_string(),
            ));
        }
        if s.len() > MAX_ID_LEN {
            return Err(SessionError::InvalidArgument(format!(
                "session id longer than {MAX_ID_LEN} bytes"
            )));
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(SessionError::InvalidArgument(format!(
                "session id contains unsupported characters: {s:?}"
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Mint a fresh id: random UUIDv4 in simple (32 hex chars) form.
///
/// Random rather than time-ordered so ids reveal nothing about creation
/// order. Touches no storage.
pub fn new_id() -> SessionId {
    SessionId(Uuid::new_v4().simple().to_string())
}

impl TryFrom<String> for SessionId {
    type Error = SessionError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
