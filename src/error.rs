//! Error types for the Honey relay

use std::time::Duration;

use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the relay
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Every protocol variant failed before a stream started
    #[error("inference backend unavailable: {last_error}")]
    BackendUnavailable {
        /// Last failure observed while walking the fallback list
        last_error: String,
    },

    /// The backend stream broke after it had started
    #[error("inference stream interrupted: {0}")]
    StreamInterrupted(String),

    /// Generation exceeded its time budget
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    /// Retryable messaging sink failure (network, 429, 5xx)
    #[error("sink transient error: {message}")]
    SinkTransient {
        message: String,
        /// Server-provided back-off hint, if any
        retry_after: Option<Duration>,
    },

    /// Non-retryable messaging sink failure
    #[error("channel error: {0}")]
    Channel(String),

    /// Webhook secret mismatch
    #[error("unauthorized")]
    Unauthorized,

    /// The turn was replaced by a newer message in the same conversation
    #[error("superseded by a newer turn")]
    Superseded,

    /// Suggestion catalog could not be loaded
    #[error("catalog error: {0}")]
    Catalog(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether a sink operation failing with this error is worth one retry
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::SinkTransient { .. } | Self::Http(_))
    }

    /// Back-off hint carried by a rate-limited sink response
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::SinkTransient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let transient = Error::SinkTransient {
            message: "502".to_string(),
            retry_after: Some(Duration::from_secs(2)),
        };
        assert!(transient.is_transient());
        assert_eq!(transient.retry_after(), Some(Duration::from_secs(2)));

        assert!(!Error::Channel("chat not found".to_string()).is_transient());
        assert!(!Error::Superseded.is_transient());
        assert_eq!(Error::Unauthorized.retry_after(), None);
    }

    #[test]
    fn backend_unavailable_carries_last_error() {
        let e = Error::BackendUnavailable {
            last_error: "404 Not Found".to_string(),
        };
        assert!(e.to_string().contains("404 Not Found"));
    }
}
