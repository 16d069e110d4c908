//! Error types for the catalog pipeline.
//!
//! Library crates use [`CatalogError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Connection, timeout, or HTTP status failure reaching the listing service.
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body does not match the expected listing shape.
    #[error("decode error: {message}")]
    Decode { message: String },

    /// A raw record field cannot be coerced to its canonical type.
    #[error("normalization error on `{field}`: {message}")]
    Normalization { field: String, message: String },

    /// The catalog store rejected a read or write.
    #[error("store error: {0}")]
    Store(String),

    /// Search index build or query failure.
    #[error("index error: {0}")]
    Index(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (bad identifier, unknown category, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The operation was cancelled by its parent context.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// A spawned task panicked before returning a result.
    #[error("task panicked: {0}")]
    Panicked(String),
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

    /// Create a decode error from any displayable message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    /// Create a normalization error for one canonical field.
    pub fn normalization(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Normalization {
            field: field.into(),
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

    /// Whether this error aborts only the current category crawl
    /// (as opposed to the whole ingestion run).
    pub fn is_category_scoped(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Decode { .. } | Self::Cancelled(_) | Self::Panicked(_)
        )
    }
}
