//! Error types for Cadence.

use thiserror::Error;

/// Result type alias using Cadence's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Cadence.
#[derive(Error, Debug)]
pub enum Error {
    // Network errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] HttpError),

    #[error("Network error: {0}")]
    Network(String),

    // Audio errors
    #[error("Audio decode error: {0}")]
    AudioDecode(String),

    #[error("Audio output error: {0}")]
    AudioOutput(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported audio backend: {0}")]
    UnsupportedBackend(String),

    #[error("Audio format was never set on the renderer")]
    FormatNotSet,

    #[error("Not enough room in audio buffer: requested {requested} bytes, {free} free")]
    BufferOverflow { requested: usize, free: usize },

    #[error("Invalid seek target: {0} seconds")]
    InvalidSeek(f64),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    // Generic errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// HTTP-specific errors.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Request failed with status {status}: {message}")]
    StatusError { status: u16, message: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl Error {
    /// Returns true if this error is retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Http(HttpError::ConnectionFailed(_) | HttpError::Timeout)
        )
    }

    /// Returns true if the failure only concerns the current track.
    ///
    /// The playback loop skips to the next playlist entry on these instead of
    /// abandoning the session.
    pub const fn is_skippable(&self) -> bool {
        matches!(
            self,
            Self::AudioDecode(_)
                | Self::UnsupportedFormat(_)
                | Self::Io(_)
                | Self::Http(_)
                | Self::Network(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(Error::Network("test".into()).is_retryable());
        assert!(Error::Http(HttpError::Timeout).is_retryable());
        assert!(!Error::Http(HttpError::StatusError {
            status: 404,
            message: "Not Found".into()
        })
        .is_retryable());
        assert!(!Error::InvalidArgument("test".into()).is_retryable());
    }

    #[test]
    fn test_error_skippable() {
        assert!(Error::UnsupportedFormat("xyz".into()).is_skippable());
        assert!(Error::AudioDecode("corrupt".into()).is_skippable());
        assert!(!Error::FormatNotSet.is_skippable());
        assert!(!Error::BufferOverflow {
            requested: 10,
            free: 2
        }
        .is_skippable());
    }

    #[test]
    fn test_error_display() {
        let err = Error::BufferOverflow {
            requested: 4096,
            free: 1024,
        };
        assert_eq!(
            err.to_string(),
            "Not enough room in audio buffer: requested 4096 bytes, 1024 free"
        );
        assert_eq!(
            Error::UnsupportedBackend("OpenAL".into()).to_string(),
            "Unsupported audio backend: OpenAL"
        );
    }
}
