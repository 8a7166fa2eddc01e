//! Error types for stream decoding.

use thiserror::Error;

/// Result type alias for stream operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while demultiplexing or decoding an engine stream.
#[derive(Debug, Error)]
pub enum Error {
    /// Read or write failure on the source or one of the sinks.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended inside a frame header.
    #[error("short frame header: got {read} of 8 bytes")]
    ShortHeader { read: usize },

    /// The stream ended inside a frame payload.
    #[error("short frame payload: got {read} of {expected} bytes")]
    ShortPayload { expected: usize, read: usize },

    /// Malformed JSON, or a value truncated by end of stream.
    #[error("malformed JSON record: {0}")]
    Decode(#[source] serde_json::Error),

    /// A record decoded cleanly but reported that the operation failed.
    #[error("operation failed: {0}")]
    Operation(String),
}

impl Error {
    /// Returns true if the stream ended in the middle of a frame.
    #[must_use]
    pub const fn is_framing(&self) -> bool {
        matches!(self, Self::ShortHeader { .. } | Self::ShortPayload { .. })
    }

    /// Returns true if a JSON value could not be decoded.
    #[must_use]
    pub const fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }

    /// Returns true if a decoded record carried an operation failure.
    #[must_use]
    pub const fn is_operation(&self) -> bool {
        matches!(self, Self::Operation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_predicates() {
        assert!(Error::ShortHeader { read: 3 }.is_framing());
        assert!(Error::ShortPayload {
            expected: 10,
            read: 4
        }
        .is_framing());
        assert!(!Error::Operation("denied".into()).is_framing());
    }

    #[test]
    fn test_display() {
        let err = Error::ShortPayload {
            expected: 10,
            read: 4,
        };
        assert_eq!(err.to_string(), "short frame payload: got 4 of 10 bytes");
        assert_eq!(
            Error::Operation("manifest unknown".into()).to_string(),
            "operation failed: manifest unknown"
        );
    }
}
