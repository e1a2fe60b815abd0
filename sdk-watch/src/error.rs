//! Watch pipeline error types using thiserror 2.0.

use std::path::PathBuf;

use sdk_common::Retryable;
use thiserror::Error;

/// Errors raised by the watcher, notifier and loader.
#[derive(Error, Debug)]
pub enum WatchError {
    /// Registered path is missing
    #[error("path does not exist: {}", .0.display())]
    PathDoesNotExist(PathBuf),

    /// Path exists but could not be made absolute
    #[error("cannot resolve path {}: {source}", path.display())]
    PathResolution {
        /// The path as given by the caller
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// Paths may only be added before the watcher starts
    #[error("watcher already started")]
    AlreadyStarted,

    /// `start` was called with an empty watch set
    #[error("no paths configured")]
    NoPathsConfigured,

    /// A notifier or loader was constructed without paths
    #[error("no paths specified")]
    NoPathsSpecified,

    /// The extension filter is empty or missing where required
    #[error("extension must not be empty")]
    EmptyExtension,

    /// The loader was configured without a storage backend
    #[error("storage not specified")]
    StorageNotSpecified,

    /// The atomic-replace marker is not a valid regex
    #[error("invalid atomic marker pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The initial scan could not read a root
    #[error("initial scan of {} failed: {source}", path.display())]
    InitialScan {
        /// Root being scanned
        path: PathBuf,
        /// Underlying walk failure
        source: walkdir::Error,
    },

    /// No tokio runtime is available to run the dispatch task
    #[error("no tokio runtime available")]
    NoRuntime,

    /// OS notification layer failure
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
}

/// Result type for watch operations.
pub type WatchResult<T> = Result<T, WatchError>;

impl WatchError {
    /// Create a path-does-not-exist error.
    #[must_use]
    pub fn missing(path: impl Into<PathBuf>) -> Self {
        Self::PathDoesNotExist(path.into())
    }

    /// Check if this error is a configuration error, i.e. the caller must
    /// change its input before trying again.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(
            self,
            Self::PathDoesNotExist(_)
                | Self::AlreadyStarted
                | Self::NoPathsConfigured
                | Self::NoPathsSpecified
                | Self::EmptyExtension
                | Self::StorageNotSpecified
                | Self::InvalidPattern(_)
        )
    }
}

impl Retryable for WatchError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::InitialScan { .. } | Self::Notify(_))
    }
}
