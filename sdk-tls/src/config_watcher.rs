//! TLS material kept live from a certificate directory.

use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use sdk_watch::{KeyStrategy, LoaderConfig, ReadOnlyStore, ResourceLoader};
use tracing::debug;

use crate::config::MtlsConfig;
use crate::error::{CertError, CertResult};
use crate::material::{PemSources, TlsConfiguration};

/// Watches a certificate directory and assembles a [`TlsConfiguration`]
/// from its current contents on demand.
///
/// The directory is loaded with file names as keys, so `get` looks up
/// `tls.crt`, `tls.key` and `ca.crt` (or the configured names) directly.
#[derive(Debug)]
pub struct CertConfigWatcher {
    loader: ResourceLoader,
    cert_file: String,
    key_file: String,
    ca_file: String,
    provider: Arc<CryptoProvider>,
}

impl CertConfigWatcher {
    /// Build a watcher over `config.cert_dir` using the ring provider.
    ///
    /// # Errors
    ///
    /// [`CertError::Watch`] if the directory does not exist.
    pub fn new(config: &MtlsConfig) -> CertResult<Self> {
        Self::with_provider(config, Arc::new(rustls::crypto::ring::default_provider()))
    }

    /// Build a watcher that loads keys with a specific crypto provider.
    ///
    /// # Errors
    ///
    /// [`CertError::Watch`] if the directory does not exist.
    pub fn with_provider(config: &MtlsConfig, provider: Arc<CryptoProvider>) -> CertResult<Self> {
        let loader = ResourceLoader::new(
            LoaderConfig::new([&config.cert_dir])
                .with_key_strategy(KeyStrategy::NameWithExtension)
                .with_subfolders(config.watch_subfolders),
        )?;
        Ok(Self {
            loader,
            cert_file: config.cert_file.clone(),
            key_file: config.key_file.clone(),
            ca_file: config.ca_file.clone(),
            provider,
        })
    }

    /// Load the directory and start watching it.
    ///
    /// # Errors
    ///
    /// [`CertError::Watch`] if the initial scan or the watcher fails.
    pub fn start(&mut self) -> CertResult<()> {
        self.loader.start_watching()?;
        Ok(())
    }

    /// Stop watching. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.loader.stop_watching();
    }

    /// Re-read the directory into the store.
    ///
    /// # Errors
    ///
    /// [`CertError::Watch`] if the directory cannot be read.
    pub fn refresh(&self) -> CertResult<()> {
        self.loader.rescan()?;
        Ok(())
    }

    /// Assemble a configuration from the store's current contents.
    ///
    /// # Errors
    ///
    /// [`CertError::NoValue`] when the certificate or key is missing, a
    /// parse error when material is malformed.
    pub fn get(&self) -> CertResult<TlsConfiguration> {
        let store = self.loader.storage();
        let cert = store
            .get(&self.cert_file)
            .ok_or_else(|| CertError::no_value(&self.cert_file))?;
        let key = store
            .get(&self.key_file)
            .ok_or_else(|| CertError::no_value(&self.key_file))?;
        let ca = store.get(&self.ca_file);
        if ca.is_none() {
            debug!(file = %self.ca_file, "no CA bundle, peer verification disabled");
        }

        TlsConfiguration::from_pem(
            PemSources {
                cert: (self.cert_file.as_str(), cert.as_slice()),
                key: (self.key_file.as_str(), key.as_slice()),
                ca: ca.as_deref().map(|pem| (self.ca_file.as_str(), pem)),
            },
            Arc::clone(&self.provider),
        )
    }

    /// Read-only view of the loaded files.
    #[must_use]
    pub fn storage(&self) -> ReadOnlyStore<String, Vec<u8>> {
        self.loader.storage()
    }

    /// Whether the directory is being watched.
    #[must_use]
    pub const fn is_watching(&self) -> bool {
        self.loader.is_watching()
    }
}
