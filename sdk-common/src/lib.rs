//! Shared library for cross-cutting concerns in platform Rust services.
//!
//! This crate provides centralized implementations for:
//! - Error types with retryability classification
//! - Retry policies with exponential backoff
//! - Structured logging setup with an owned, runtime-adjustable level
//! - Environment overrides for configuration structs

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod retry;
pub mod tracing_config;

pub use config::{EnvOverrides, duration_ms};
pub use error::{PlatformError, Retryable};
pub use retry::{RetryConfig, RetryPolicy};
pub use tracing_config::{LogLevelHandle, TracingConfig, build_dispatch, init_tracing};
