//! Assembly of rustls material from PEM bytes.

use std::io::Cursor;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, InconsistentKeys, RootCertStore, ServerConfig};
use tracing::debug;

use crate::error::{CertError, CertResult};
use crate::resolver::StaticCert;

/// PEM inputs for one assembly, tagged with their store keys for error
/// messages.
#[derive(Debug, Clone, Copy)]
pub struct PemSources<'a> {
    /// Certificate chain PEM and its key
    pub cert: (&'a str, &'a [u8]),
    /// Private key PEM and its key
    pub key: (&'a str, &'a [u8]),
    /// Optional CA bundle PEM and its key
    pub ca: Option<(&'a str, &'a [u8])>,
}

/// A certificate chain with its signing key and the CA pool used to verify
/// peers.
#[derive(Debug, Clone)]
pub struct TlsConfiguration {
    certificates: Vec<Arc<CertifiedKey>>,
    ca_pool: Arc<RootCertStore>,
    provider: Arc<CryptoProvider>,
}

impl TlsConfiguration {
    /// Parse and validate PEM material.
    ///
    /// # Errors
    ///
    /// Returns a parse error for unreadable PEM,
    /// [`CertError::KeyMismatch`] when the key does not belong to the leaf
    /// certificate and [`CertError::CaBundle`] for a CA bundle without a
    /// usable certificate.
    pub fn from_pem(sources: PemSources<'_>, provider: Arc<CryptoProvider>) -> CertResult<Self> {
        let (cert_name, cert_pem) = sources.cert;
        let (key_name, key_pem) = sources.key;

        let chain = parse_certs(cert_pem).map_err(|reason| CertError::CertificateParse {
            file: cert_name.to_string(),
            reason,
        })?;
        let key = parse_key(key_pem).map_err(|reason| CertError::PrivateKeyParse {
            file: key_name.to_string(),
            reason,
        })?;
        let signing_key = provider
            .key_provider
            .load_private_key(key)
            .map_err(|e| CertError::PrivateKeyParse {
                file: key_name.to_string(),
                reason: e.to_string(),
            })?;

        let certified = CertifiedKey::new(chain, signing_key);
        match certified.keys_match() {
            Ok(()) => {}
            Err(rustls::Error::InconsistentKeys(InconsistentKeys::Unknown)) => {
                debug!(file = cert_name, "key algorithm cannot be matched against certificate");
            }
            Err(_) => return Err(CertError::KeyMismatch),
        }

        let ca_pool = match sources.ca {
            Some((ca_name, ca_pem)) => ca_store(ca_pem).map_err(|reason| CertError::CaBundle {
                file: ca_name.to_string(),
                reason,
            })?,
            None => RootCertStore::empty(),
        };

        Ok(Self {
            certificates: vec![Arc::new(certified)],
            ca_pool: Arc::new(ca_pool),
            provider,
        })
    }

    /// Certificate chains with their keys. Always exactly one.
    #[must_use]
    pub fn certificates(&self) -> &[Arc<CertifiedKey>] {
        &self.certificates
    }

    /// The leaf certificate and key.
    #[must_use]
    pub fn certified_key(&self) -> Option<Arc<CertifiedKey>> {
        self.certificates.first().cloned()
    }

    /// Trust anchors for peer verification; empty when no CA bundle exists.
    #[must_use]
    pub fn ca_pool(&self) -> Arc<RootCertStore> {
        Arc::clone(&self.ca_pool)
    }

    /// Crypto provider the material was loaded with.
    #[must_use]
    pub fn provider(&self) -> Arc<CryptoProvider> {
        Arc::clone(&self.provider)
    }

    /// Server configuration presenting this certificate. Client
    /// certificates are required whenever the CA pool is non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Configuration`] if rustls rejects the setup.
    pub fn server_config(&self) -> CertResult<ServerConfig> {
        let cert = self.leaf()?;
        let builder = ServerConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_safe_default_protocol_versions()
            .map_err(CertError::configuration)?;

        let builder = if self.ca_pool.is_empty() {
            builder.with_no_client_auth()
        } else {
            let verifier =
                WebPkiClientVerifier::builder_with_provider(self.ca_pool(), Arc::clone(&self.provider))
                    .build()
                    .map_err(CertError::configuration)?;
            builder.with_client_cert_verifier(verifier)
        };
        Ok(builder.with_cert_resolver(Arc::new(StaticCert::new(cert))))
    }

    /// Client configuration presenting this certificate and trusting the
    /// CA pool.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Configuration`] if rustls rejects the setup.
    pub fn client_config(&self) -> CertResult<ClientConfig> {
        let cert = self.leaf()?;
        Ok(ClientConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_safe_default_protocol_versions()
            .map_err(CertError::configuration)?
            .with_root_certificates(self.ca_pool())
            .with_client_cert_resolver(Arc::new(StaticCert::new(cert))))
    }

    fn leaf(&self) -> CertResult<Arc<CertifiedKey>> {
        self.certified_key()
            .ok_or_else(|| CertError::configuration("no certificate loaded"))
    }
}

fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, String> {
    let certs = rustls_pemfile::certs(&mut Cursor::new(pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;
    if certs.is_empty() {
        return Err("no PEM certificate found".to_string());
    }
    Ok(certs)
}

fn parse_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, String> {
    rustls_pemfile::private_key(&mut Cursor::new(pem))
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "no PEM private key found".to_string())
}

fn ca_store(pem: &[u8]) -> Result<RootCertStore, String> {
    let certs = parse_certs(pem)?;
    let mut store = RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(certs);
    if added == 0 {
        return Err(format!("none of {ignored} certificates usable as trust anchors"));
    }
    debug!(added, ignored, "CA pool loaded");
    Ok(store)
}
