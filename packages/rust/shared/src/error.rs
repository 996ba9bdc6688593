//! Error types for repowiki.
//!
//! Library crates use [`RepoWikiError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all repowiki operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoWikiError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Knowledge engine request failed (transport, HTTP status, or response shape).
    #[error("engine error: {0}")]
    Engine(String),

    /// Completion or embedding provider error.
    #[error("model error: {0}")]
    Model(String),

    /// Data validation error (invalid structure, unexpected format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// No candidate file produced a document worth ingesting.
    #[error("nothing to index: {skipped} file(s) skipped, {errors} error(s)")]
    NothingToIndex { skipped: usize, errors: usize },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RepoWikiError>;

impl RepoWikiError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
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
        let err = RepoWikiError::config("MIN_FILE_SIZE must be an integer");
        assert_eq!(
            err.to_string(),
            "config error: MIN_FILE_SIZE must be an integer"
        );

        let err = RepoWikiError::NothingToIndex {
            skipped: 3,
            errors: 1,
        };
        assert_eq!(
            err.to_string(),
            "nothing to index: 3 file(s) skipped, 1 error(s)"
        );
    }

    #[test]
    fn io_error_keeps_path() {
        let err = RepoWikiError::io(
            "/tmp/missing.md",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("missing.md"));
    }
}
