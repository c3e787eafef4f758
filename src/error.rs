//! Error types for multicopy
//!
//! Two layers: [`PipelineError`] describes why a single transfer stopped and
//! never escapes the run that produced it, while [`CopyError`] is the
//! crate-level error returned by fallible library calls and the CLI.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failure category of a single pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The source file could not be opened for reading
    OpenSourceFailed,
    /// The destination file could not be created or truncated
    OpenDestFailed,
    /// No completion signal could be allocated for the pipeline
    SignalCreateFailed,
    /// A read submission or the retrieval of its result failed
    ReadFailed,
    /// A write failed or wrote fewer bytes than requested
    WriteFailed,
    /// The completion wait failed and the run was aborted
    WaitFailed,
}

impl ErrorKind {
    /// Stable identifier, used in status lines and JSON output
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenSourceFailed => "open_source_failed",
            Self::OpenDestFailed => "open_dest_failed",
            Self::SignalCreateFailed => "signal_create_failed",
            Self::ReadFailed => "read_failed",
            Self::WriteFailed => "write_failed",
            Self::WaitFailed => "wait_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal error of one pipeline
#[derive(Error, Debug)]
#[error("{kind} at '{path}': {source}")]
pub struct PipelineError {
    /// What went wrong
    pub kind: ErrorKind,
    /// Path the failing operation was acting on
    pub path: PathBuf,
    /// Underlying OS error
    #[source]
    pub source: std::io::Error,
}

impl PipelineError {
    /// Create a pipeline error
    pub fn new(kind: ErrorKind, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self {
            kind,
            path: path.into(),
            source,
        }
    }

    /// Build the error reported when a write accepted fewer bytes than asked
    pub fn short_write(path: impl Into<PathBuf>, written: usize, requested: usize) -> Self {
        Self::new(
            ErrorKind::WriteFailed,
            path,
            std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes", written, requested),
            ),
        )
    }

    /// Raw OS error code, when the failure came from the operating system
    pub fn os_code(&self) -> Option<i32> {
        self.source.raw_os_error()
    }
}

/// Main error type for multicopy operations
#[derive(Error, Debug)]
pub enum CopyError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File or directory not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// A transfer failed
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The I/O thread pool could not be started
    #[error("I/O pool error: {0}")]
    IoPool(String),

    /// Hash verification failed
    #[error("Integrity check failed for '{path}': expected {expected}, got {actual}")]
    IntegrityMismatch {
        /// Destination that failed the check
        path: PathBuf,
        /// Source digest
        expected: String,
        /// Destination digest
        actual: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Report serialization error
    #[error("Report serialization error: {0}")]
    Report(String),
}

impl CopyError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. } | Self::NotFound(path) | Self::IntegrityMismatch { path, .. } => {
                Some(path)
            }
            Self::Pipeline(e) => Some(&e.path),
            _ => None,
        }
    }
}

/// Result type alias for multicopy operations
pub type Result<T> = std::result::Result<T, CopyError>;

impl From<std::io::Error> for CopyError {
    fn from(err: std::io::Error) -> Self {
        CopyError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for CopyError {
    fn from(err: serde_json::Error) -> Self {
        CopyError::Report(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| CopyError::io(path, e))
    }
}
