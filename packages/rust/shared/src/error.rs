//! Error types for scrapedesk.
//!
//! Library crates use [`ScrapeDeskError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::{FileKind, PhaseKind};

/// Top-level error type for all scrapedesk operations.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeDeskError {
    /// An uploaded file could not be decoded, or has an unsupported format.
    #[error("ingest error ({kind}): {message}")]
    Ingest { kind: FileKind, message: String },

    /// An upload's file name names a format that cannot be ingested.
    #[error("ingest error: unsupported file {}: expected a .csv or .xlsx file", path.display())]
    UnsupportedFile { path: PathBuf },

    /// A phase was started (or reset) while a job was still running.
    #[error("{phase} job is already running")]
    JobAlreadyRunning { phase: PhaseKind },

    /// The remote scraping service rejected the request or was unreachable.
    /// The message is operator-facing.
    #[error("{message}")]
    Remote { message: String },

    /// The in-flight operation was cancelled by the operator.
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Caller supplied arguments that break a precondition.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Spreadsheet export failed.
    #[error("export error: {0}")]
    Export(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScrapeDeskError>;

impl ScrapeDeskError {
    /// Create an ingest error for the given file kind.
    pub fn ingest(kind: FileKind, msg: impl Into<String>) -> Self {
        Self::Ingest {
            kind,
            message: msg.into(),
        }
    }

    /// Create a remote error from an operator-facing message.
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote {
            message: msg.into(),
        }
    }

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

    /// Whether this error represents operator cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
