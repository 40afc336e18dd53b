//! Error types for PaperDigest.
//!
//! Library crates use [`PaperDigestError`] via `thiserror`.
//! Each pipeline stage also has its own narrow error enum (in its crate) that
//! converts into this one when the driver decides the failure is fatal.
//! The CLI wraps everything with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all PaperDigest operations.
#[derive(Debug, thiserror::Error)]
pub enum PaperDigestError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to an external service.
    #[error("network error: {0}")]
    Network(String),

    /// The paper search index could not be queried.
    #[error("paper source unavailable: {0}")]
    SourceUnavailable(String),

    /// Feed, document or response parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Persisted state (processed-id cache) error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (empty keyword set, bad option value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PaperDigestError>;

impl PaperDigestError {
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
