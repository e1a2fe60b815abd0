//! Centralized error types shared by the SDK crates.
//!
//! [`PlatformError`] covers the cross-cutting helpers in this crate. The
//! [`Retryable`] trait lets crate-specific errors plug into
//! [`crate::RetryPolicy`].

use thiserror::Error;

/// Classification used by [`crate::RetryPolicy`] to decide whether a failed
/// operation may be attempted again.
pub trait Retryable {
    /// Returns `true` if the failure is transient.
    fn is_retryable(&self) -> bool;
}

/// Errors raised while setting up shared infrastructure.
///
/// Neither variant is transient: the caller must change its input.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Logging could not be installed or reconfigured
    #[error("Logging error: {0}")]
    Logging(String),
}

impl PlatformError {
    /// Create an invalid configuration error with the given message.
    ///
    /// # Examples
    ///
    /// ```
    /// use sdk_common::{PlatformError, Retryable};
    ///
    /// let err = PlatformError::invalid_config("missing cert_dir");
    /// assert!(!err.is_retryable());
    /// ```
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a logging error with the given message.
    #[must_use]
    pub fn logging(msg: impl Into<String>) -> Self {
        Self::Logging(msg.into())
    }
}

impl Retryable for PlatformError {
    fn is_retryable(&self) -> bool {
        false
    }
}
