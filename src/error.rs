//! Error taxonomy for the harvest pipeline

use std::io;

/// Broad classification the runner matches on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network failure, timeout or non-2xx status. Recovered locally.
    Transient,
    /// Malformed payload or item. Recovered locally.
    Parse,
    /// Aborts the whole run.
    Fatal,
    /// Run was interrupted by the operator.
    Cancelled,
}

/// Error type for harvest operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out")]
    Timeout,
    #[error("Unexpected HTTP status: {0}")]
    Status(u16),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("TOML error: {0}")]
    Toml(String),
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(_) | Error::Timeout | Error::Status(_) => ErrorKind::Transient,
            Error::Parse(_) | Error::Json(_) => ErrorKind::Parse,
            Error::Config(_) | Error::Io(_) | Error::Toml(_) => ErrorKind::Fatal,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether another attempt at the same request could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout)
    }
}

/// Result type for harvest operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else if let Some(status) = err.status() {
            Error::Status(status.as_u16())
        } else {
            Error::Network(err.to_string())
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Toml(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Toml(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::Timeout.kind(), ErrorKind::Transient);
        assert_eq!(Error::Status(503).kind(), ErrorKind::Transient);
        assert_eq!(Error::Parse("bad".into()).kind(), ErrorKind::Parse);
        assert_eq!(Error::Config("empty".into()).kind(), ErrorKind::Fatal);
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_status_is_not_retryable() {
        assert!(Error::Network("refused".into()).is_retryable());
        assert!(Error::Timeout.is_retryable());
        assert!(!Error::Status(500).is_retryable());
        assert!(!Error::Parse("bad".into()).is_retryable());
    }

    #[test]
    fn test_json_error_conversion() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }
}
