use thiserror::Error;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The caller passed an empty or malformed session id.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backing directory or database could not be read or written.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageFault),

    /// A persisted record exists but cannot be parsed.
    ///
    /// `SessionManager` recovers from this locally; it never reaches callers
    /// of `load`.
    #[error("corrupt session record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },
}

/// Underlying cause of a `StorageUnavailable` error.
#[derive(Debug, Error)]
pub enum StorageFault {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SessionError {
    pub fn corrupt(id: impl Into<String>, reason: impl ToString) -> Self {
        Self::CorruptRecord {
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    /// Short error code string for JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::InvalidArgument(_) => "INVALID_ARGUMENT",
            SessionError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            SessionError::CorruptRecord { .. } => "CORRUPT_RECORD",
        }
    }
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::StorageUnavailable(StorageFault::Io(e))
    }
}

impl From<rusqlite::Error> for SessionError {
    fn from(e: rusqlite::Error) -> Self {
        SessionError::StorageUnavailable(StorageFault::Database(e))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
