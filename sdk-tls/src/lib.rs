//! Live-reloading mTLS material for platform services.
//!
//! Provides the certificate directory configuration, assembly of rustls
//! material from PEM files, a watcher that keeps it current and a resolver
//! that lets listeners serve the latest certificate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cert_watcher;
pub mod config;
pub mod config_watcher;
pub mod error;
pub mod material;
pub mod resolver;

pub use cert_watcher::{CertWatcher, ReloadCallback, ReloadOutcome, ReloadStatus};
pub use config::MtlsConfig;
pub use config_watcher::CertConfigWatcher;
pub use error::{CertError, CertResult};
pub use material::{PemSources, TlsConfiguration};
pub use resolver::{ReloadingResolver, StaticCert};
