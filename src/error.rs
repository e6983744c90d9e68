//! Structured error types for configuration sources.

use serde::Serialize;
use std::path::PathBuf;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Not found errors
    FileNotFound,
    KeyNotFound,

    // Input errors
    MalformedInput,
    UnsupportedFileType,

    // Internal errors
    IoError,
    WatcherError,
}

/// Errors surfaced by configuration sources.
///
/// Watch-time failures never reach callers; they are logged by the watch loop.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("[{}] file not exist", .0.display())]
    FileNotFound(PathBuf),

    #[error("key does not exist: {0}")]
    KeyNotFound(String),

    #[error("failed to read [{}]: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("yaml unmarshal [{}] failed: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("yaml document in [{}] must be a mapping, found {found}", path.display())]
    InvalidDocument { path: PathBuf, found: &'static str },

    #[error("file type of [{}] not supported", .0.display())]
    UnsupportedFileType(PathBuf),

    #[error("file watcher error: {0}")]
    Watcher(#[from] notify::Error),
}

impl SourceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SourceError::FileNotFound(_) => ErrorCode::FileNotFound,
            SourceError::KeyNotFound(_) => ErrorCode::KeyNotFound,
            SourceError::Io { .. } => ErrorCode::IoError,
            SourceError::Parse { .. } | SourceError::InvalidDocument { .. } => {
                ErrorCode::MalformedInput
            }
            SourceError::UnsupportedFileType(_) => ErrorCode::UnsupportedFileType,
            SourceError::Watcher(_) => ErrorCode::WatcherError,
        }
    }

    /// Returns true for errors that mean "nothing there" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self.code(), ErrorCode::FileNotFound | ErrorCode::KeyNotFound)
    }
}

/// Result type for source operations.
pub type SourceResult<T> = std::result::Result<T, SourceError>;
