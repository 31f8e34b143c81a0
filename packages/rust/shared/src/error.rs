//! Error types for citegraph.
//!
//! Library crates use [`CitegraphError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all citegraph operations.
#[derive(Debug, thiserror::Error)]
pub enum CitegraphError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// HTTP client construction or transport error.
    #[error("network error: {0}")]
    Network(String),

    /// Front-matter, bibliography, or JSON parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Cache or artifact persistence error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (missing id, wrong field shape, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CitegraphError>;

impl CitegraphError {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = CitegraphError::config("max_attempts must be at least 1");
        assert_eq!(err.to_string(), "config error: max_attempts must be at least 1");

        let err = CitegraphError::validation("missing `id` in front matter");
        assert!(err.to_string().contains("missing `id`"));
    }

    #[test]
    fn io_error_carries_path() {
        let err = CitegraphError::io(
            "milestones",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let msg = err.to_string();
        assert!(msg.contains("milestones"));
        assert!(msg.contains("gone"));
    }
}
