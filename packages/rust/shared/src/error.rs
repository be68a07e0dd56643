//! Error types for catalogbuilder.
//!
//! Library crates use [`CatalogError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all catalogbuilder operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Application config or product-line Config loading/validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Flat text or JSON parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Workbook reading or writing error.
    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),

    /// Template (gabarito) missing or unusable.
    #[error("template error: {message}")]
    Template { message: String },

    /// Persisted code cache error.
    #[error("cache error: {0}")]
    Cache(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
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

    /// Create a template error from any displayable message.
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template {
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
