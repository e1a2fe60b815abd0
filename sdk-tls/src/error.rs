//! TLS error types using thiserror 2.0.

use sdk_common::Retryable;
use sdk_watch::WatchError;
use thiserror::Error;

/// Errors raised while assembling or reloading TLS material.
#[derive(Error, Debug)]
pub enum CertError {
    /// A required file is not in the store
    #[error("no value found for {0}")]
    NoValue(String),

    /// The certificate PEM could not be parsed
    #[error("failed to parse certificate {file}: {reason}")]
    CertificateParse {
        /// Store key of the certificate
        file: String,
        /// Parser message
        reason: String,
    },

    /// The private key PEM could not be parsed or loaded
    #[error("failed to parse private key {file}: {reason}")]
    PrivateKeyParse {
        /// Store key of the private key
        file: String,
        /// Parser message
        reason: String,
    },

    /// The private key does not belong to the leaf certificate
    #[error("private key does not match certificate")]
    KeyMismatch,

    /// The CA bundle contained no usable certificate
    #[error("invalid CA bundle {file}: {reason}")]
    CaBundle {
        /// Store key of the CA bundle
        file: String,
        /// Parser message
        reason: String,
    },

    /// rustls rejected the assembled configuration
    #[error("TLS configuration error: {0}")]
    Configuration(String),

    /// Watch pipeline error
    #[error(transparent)]
    Watch(#[from] WatchError),
}

/// Result type for TLS operations.
pub type CertResult<T> = Result<T, CertError>;

impl CertError {
    /// Create a missing-value error.
    #[must_use]
    pub fn no_value(file: impl Into<String>) -> Self {
        Self::NoValue(file.into())
    }

    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl std::fmt::Display) -> Self {
        Self::Configuration(msg.to_string())
    }
}

impl Retryable for CertError {
    /// Files may be caught mid-rotation, so anything derived from their
    /// content is worth another attempt.
    fn is_retryable(&self) -> bool {
        match self {
            Self::NoValue(_)
            | Self::CertificateParse { .. }
            | Self::PrivateKeyParse { .. }
            | Self::KeyMismatch
            | Self::CaBundle { .. } => true,
            Self::Configuration(_) => false,
            Self::Watch(e) => e.is_retryable(),
        }
    }
}
