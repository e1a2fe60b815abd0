//! Configuration helpers shared by the SDK's config structs.
//!
//! Config structs follow one shape: `Default`, `with_*` builders, serde
//! `Deserialize` with `#[serde(default)]`, and an `apply_env` method that
//! takes an [`EnvOverrides`] so the environment source can be swapped out.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Source of environment-style overrides.
pub struct EnvOverrides {
    prefix: String,
    lookup: Lookup,
}

impl std::fmt::Debug for EnvOverrides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvOverrides")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl EnvOverrides {
    /// Read overrides from the process environment.
    #[must_use]
    pub fn from_process(prefix: impl Into<String>) -> Self {
        Self::from_fn(prefix, |key| std::env::var(key).ok())
    }

    /// Read overrides from a fixed map.
    #[must_use]
    pub fn from_map(prefix: impl Into<String>, values: HashMap<String, String>) -> Self {
        Self::from_fn(prefix, move |key| values.get(key).cloned())
    }

    /// Read overrides through an arbitrary lookup function.
    #[must_use]
    pub fn from_fn<F>(prefix: impl Into<String>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            prefix: prefix.into(),
            lookup: Box::new(lookup),
        }
    }

    /// Full variable name for `name`, e.g. `SDK_MTLS_` + `CERT_DIR`.
    #[must_use]
    pub fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Raw string value for `name`; empty values count as unset.
    #[must_use]
    pub fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(&self.key(name)).filter(|v| !v.is_empty())
    }

    /// Value for `name` as a path.
    #[must_use]
    pub fn path(&self, name: &str) -> Option<PathBuf> {
        self.string(name).map(PathBuf::from)
    }

    /// Value for `name` parsed with [`FromStr`]. Unparseable values are
    /// logged and ignored.
    #[must_use]
    pub fn parse<T: FromStr>(&self, name: &str) -> Option<T> {
        let raw = self.string(name)?;
        raw.parse().map_or_else(
            |_| {
                warn!(var = %self.key(name), value = %raw, "ignoring unparseable override");
                None
            },
            Some,
        )
    }

    /// Overwrite `target` when `name` is set.
    pub fn set_string(&self, name: &str, target: &mut String) {
        if let Some(v) = self.string(name) {
            *target = v;
        }
    }

    /// Overwrite `target` when `name` is set and parses.
    pub fn set_parsed<T: FromStr>(&self, name: &str, target: &mut T) {
        if let Some(v) = self.parse(name) {
            *target = v;
        }
    }
}

/// Serde helper encoding a [`std::time::Duration`] as integer milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as milliseconds.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    /// Deserialize from milliseconds.
    ///
    /// # Errors
    ///
    /// Fails when the input is not an unsigned integer.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
