//! Error types for Newswatch.
//!
//! Library crates use [`NewswatchError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Newswatch operations.
#[derive(Debug, thiserror::Error)]
pub enum NewswatchError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to an article host or API.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed date, URL, or pattern.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error (including timeouts).
    #[error("storage error: {0}")]
    Storage(String),

    /// Article text could not be extracted.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Summarization or importance classification failed.
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input record, invalid value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, NewswatchError>;

impl NewswatchError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error came from the durable store.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = NewswatchError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = NewswatchError::parse("bad date '2025-13-01'");
        assert!(err.to_string().contains("2025-13-01"));
    }

    #[test]
    fn storage_kind_is_detected() {
        assert!(NewswatchError::Storage("timed out".into()).is_storage());
        assert!(!NewswatchError::Classifier("empty".into()).is_storage());
    }
}
