use thiserror::Error;

/// Roster storage failures.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the roster file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The roster file is not valid JSON of the expected shape
    #[error("Roster format error: {0}")]
    Format(#[from] serde_json::Error),

    /// A record could not be turned into a member
    #[error("Invalid member record #{id}: {message}")]
    InvalidRecord { id: u32, message: String },
}

impl StorageError {
    pub fn invalid_record(id: u32, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            id,
            message: message.into(),
        }
    }
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
