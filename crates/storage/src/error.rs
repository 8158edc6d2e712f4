//! Storage errors.

use std::path::PathBuf;
use thiserror::Error;

/// Storage errors.
///
/// Logical misses (absent keys, heights past the top) are reported as
/// `Option::None` or `false` by the lookups themselves, not through this type.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to {context} {path}: {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt header in {path}: {reason}")]
    CorruptHeader { path: PathBuf, reason: String },

    #[error("file is closed: {0}")]
    Closed(PathBuf),

    #[error("file is already started: {0}")]
    AlreadyStarted(PathBuf),

    #[error("writes halted after a failed resize: {0}")]
    Halted(PathBuf),

    #[error("read of {len} bytes at {offset} past logical end {size}")]
    OutOfBounds { offset: usize, len: usize, size: usize },

    #[error("cannot raise record count from {count} to {requested}")]
    InvalidCount { count: u32, requested: u32 },

    #[error("already initialized: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid stored data: {0}")]
    InvalidData(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

impl StorageError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptHeader {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error leaves the file unusable until it is reopened.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Halted(_) | Self::CorruptHeader { .. })
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
