//! Structured logging setup.
//!
//! The log level is owned by a [`LogLevelHandle`] returned from the setup
//! functions instead of living in a process-wide static, so callers decide
//! who may change verbosity at runtime and tests can build isolated
//! subscribers.

use serde::Deserialize;
use tracing::Dispatch;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, reload};

use crate::PlatformError;

/// Tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Service name for tracing
    pub service_name: String,
    /// Log level filter (any `EnvFilter` directive string)
    pub log_level: String,
    /// Whether to output JSON format
    pub json_output: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "rust-service".to_string(),
            log_level: "info".to_string(),
            json_output: false,
        }
    }
}

impl TracingConfig {
    /// Create config with custom service name.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Create config with custom log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable JSON output.
    #[must_use]
    pub const fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Runtime control over the level filter of one subscriber.
#[derive(Debug, Clone)]
pub struct LogLevelHandle {
    inner: reload::Handle<EnvFilter, Registry>,
}

impl LogLevelHandle {
    /// Replace the active filter with the given directives (e.g. `"debug"`
    /// or `"info,sdk_watch=trace"`).
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::InvalidConfig`] if the directives do not
    /// parse, [`PlatformError::Logging`] if the subscriber owning the filter
    /// has been dropped.
    pub fn set_level(&self, directives: &str) -> Result<(), PlatformError> {
        let filter = EnvFilter::try_new(directives)
            .map_err(|e| PlatformError::invalid_config(format!("invalid directives {directives:?}: {e}")))?;
        self.inner
            .reload(filter)
            .map_err(|e| PlatformError::logging(e.to_string()))
    }

    /// The currently active filter, rendered as directives.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        self.inner.with_current(ToString::to_string).ok()
    }
}

/// Build an independent dispatcher and the handle controlling its level.
///
/// Nothing is installed globally; use [`tracing::dispatcher::with_default`]
/// to scope it, or [`init_tracing`] for process-wide setup.
///
/// # Errors
///
/// Returns [`PlatformError::InvalidConfig`] if `log_level` is not a valid
/// filter.
pub fn build_dispatch(config: &TracingConfig) -> Result<(Dispatch, LogLevelHandle), PlatformError> {
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| PlatformError::invalid_config(format!("log_level {:?}: {e}", config.log_level)))?;
    Ok(assemble(config, filter))
}

/// Initialize tracing with the given configuration.
///
/// This sets up the global tracing subscriber; `RUST_LOG` takes precedence
/// over `log_level` when set. Should be called once at application startup.
///
/// # Errors
///
/// Returns [`PlatformError::Logging`] if a global subscriber is already set.
pub fn init_tracing(config: &TracingConfig) -> Result<LogLevelHandle, PlatformError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let (dispatch, handle) = assemble(config, filter);
    tracing::dispatcher::set_global_default(dispatch)
        .map_err(|e| PlatformError::logging(e.to_string()))?;
    tracing::debug!(service = %config.service_name, "tracing initialized");
    Ok(handle)
}

fn assemble(config: &TracingConfig, filter: EnvFilter) -> (Dispatch, LogLevelHandle) {
    let (filter, inner) = reload::Layer::new(filter);
    let registry = tracing_subscriber::registry().with(filter);

    let dispatch = if config.json_output {
        Dispatch::new(registry.with(tracing_subscriber::fmt::layer().json()))
    } else {
        Dispatch::new(registry.with(tracing_subscriber::fmt::layer()))
    };

    (dispatch, LogLevelHandle { inner })
}
