//! mTLS material configuration.

use std::path::PathBuf;

use sdk_common::{EnvOverrides, RetryConfig};
use sdk_watch::ThrottleConfig;
use serde::Deserialize;

/// Prefix of the environment variables read by [`MtlsConfig::from_env`].
pub const ENV_PREFIX: &str = "SDK_MTLS_";

/// Where the certificate material lives and how reloads behave.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MtlsConfig {
    /// Directory holding the certificate, key and CA bundle
    pub cert_dir: PathBuf,
    /// Certificate chain file name
    pub cert_file: String,
    /// Private key file name
    pub key_file: String,
    /// CA bundle file name; a missing file means an empty CA pool
    pub ca_file: String,
    /// Watch subdirectories of `cert_dir` as well
    pub watch_subfolders: bool,
    /// Debounce settings for change notifications
    pub throttle: ThrottleConfig,
    /// Retry settings for each reload
    pub retry: RetryConfig,
}

impl Default for MtlsConfig {
    fn default() -> Self {
        Self {
            cert_dir: PathBuf::from("/etc/tls"),
            cert_file: "tls.crt".to_string(),
            key_file: "tls.key".to_string(),
            ca_file: "ca.crt".to_string(),
            watch_subfolders: false,
            throttle: ThrottleConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl MtlsConfig {
    /// Create a config for `cert_dir` with conventional file names.
    #[must_use]
    pub fn new(cert_dir: impl Into<PathBuf>) -> Self {
        Self {
            cert_dir: cert_dir.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().apply_env(&EnvOverrides::from_process(ENV_PREFIX))
    }

    /// Apply `CERT_DIR`, `CERT_FILE`, `KEY_FILE` and `CA_FILE` overrides.
    #[must_use]
    pub fn apply_env(mut self, env: &EnvOverrides) -> Self {
        if let Some(dir) = env.path("CERT_DIR") {
            self.cert_dir = dir;
        }
        env.set_string("CERT_FILE", &mut self.cert_file);
        env.set_string("KEY_FILE", &mut self.key_file);
        env.set_string("CA_FILE", &mut self.ca_file);
        env.set_parsed("WATCH_SUBFOLDERS", &mut self.watch_subfolders);
        self
    }

    /// Set the certificate file name.
    #[must_use]
    pub fn with_cert_file(mut self, name: impl Into<String>) -> Self {
        self.cert_file = name.into();
        self
    }

    /// Set the private key file name.
    #[must_use]
    pub fn with_key_file(mut self, name: impl Into<String>) -> Self {
        self.key_file = name.into();
        self
    }

    /// Set the CA bundle file name.
    #[must_use]
    pub fn with_ca_file(mut self, name: impl Into<String>) -> Self {
        self.ca_file = name.into();
        self
    }

    /// Watch subdirectories as well.
    #[must_use]
    pub const fn with_subfolders(mut self, enabled: bool) -> Self {
        self.watch_subfolders = enabled;
        self
    }

    /// Set the change-notification throttle.
    #[must_use]
    pub const fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.throttle = throttle;
        self
    }

    /// Set the reload retry settings.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = MtlsConfig::default();
        assert_eq!(config.cert_dir, PathBuf::from("/etc/tls"));
        assert_eq!(config.cert_file, "tls.crt");
        assert_eq!(config.key_file, "tls.key");
        assert_eq!(config.ca_file, "ca.crt");
        assert_eq!(config.throttle.interval, Duration::from_millis(500));
    }

    #[test]
    fn test_env_overrides() {
        let env = EnvOverrides::from_map(
            ENV_PREFIX,
            HashMap::from([
                ("SDK_MTLS_CERT_DIR".to_string(), "/run/certs".to_string()),
                ("SDK_MTLS_CA_FILE".to_string(), "bundle.pem".to_string()),
                ("SDK_MTLS_KEY_FILE".to_string(), String::new()),
                ("SDK_MTLS_WATCH_SUBFOLDERS".to_string(), "true".to_string()),
            ]),
        );
        let config = MtlsConfig::default().apply_env(&env);
        assert_eq!(config.cert_dir, PathBuf::from("/run/certs"));
        assert_eq!(config.ca_file, "bundle.pem");
        assert_eq!(config.key_file, "tls.key");
        assert_eq!(config.cert_file, "tls.crt");
        assert!(config.watch_subfolders);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: MtlsConfig = serde_json::from_str(
            r#"{"cert_dir": "/srv/tls", "throttle": {"interval": 50, "burst": 0}, "retry": {"max_retries": 1}}"#,
        )
        .unwrap();
        assert_eq!(config.cert_dir, PathBuf::from("/srv/tls"));
        assert_eq!(config.throttle.burst, 0);
        assert_eq!(config.throttle.interval, Duration::from_millis(50));
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.cert_file, "tls.crt");
    }
}
