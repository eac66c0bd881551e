//! Errors raised while encoding or decoding hardware frames.

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Protocol-level failures.
///
/// None of these tear down a link: a malformed line or frame is skipped and
/// the stream continues with the next one.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A line or frame could not be interpreted.
    #[error("Malformed {what}: {message}")]
    Malformed { what: &'static str, message: String },

    /// Bytes accumulated without a terminator past the size limit.
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Invalid MML melody text.
    #[error("Invalid melody at offset {offset}: {message}")]
    InvalidMelody { offset: usize, message: String },

    /// I/O error surfaced through the codec traits.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Create a malformed-input error.
    pub fn malformed(what: &'static str, message: impl Into<String>) -> Self {
        Self::Malformed {
            what,
            message: message.into(),
        }
    }
}
