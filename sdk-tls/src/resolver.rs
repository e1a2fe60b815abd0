//! rustls certificate resolvers.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use rustls::SignatureScheme;
use rustls::client::ResolvesClientCert;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;

use crate::material::TlsConfiguration;

/// Always presents the same certificate.
#[derive(Debug)]
pub struct StaticCert(Arc<CertifiedKey>);

impl StaticCert {
    /// Wrap a certified key.
    #[must_use]
    pub const fn new(cert: Arc<CertifiedKey>) -> Self {
        Self(cert)
    }
}

impl ResolvesServerCert for StaticCert {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(Arc::clone(&self.0))
    }
}

impl ResolvesClientCert for StaticCert {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        Some(Arc::clone(&self.0))
    }

    fn has_certs(&self) -> bool {
        true
    }
}

/// Presents whichever certificate was loaded most recently, so listeners
/// pick up rotations without rebuilding their config.
#[derive(Debug, Clone)]
pub struct ReloadingResolver {
    current: Arc<ArcSwapOption<TlsConfiguration>>,
}

impl ReloadingResolver {
    pub(crate) const fn new(current: Arc<ArcSwapOption<TlsConfiguration>>) -> Self {
        Self { current }
    }

    /// The certificate a handshake starting now would use.
    #[must_use]
    pub fn current(&self) -> Option<Arc<CertifiedKey>> {
        self.current.load().as_ref().and_then(|tls| tls.certified_key())
    }
}

impl ResolvesServerCert for ReloadingResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        self.current()
    }
}

impl ResolvesClientCert for ReloadingResolver {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        self.current()
    }

    fn has_certs(&self) -> bool {
        self.current.load().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::PemSources;
    use test_utils::PemPair;

    fn load(pair: &PemPair) -> Arc<TlsConfiguration> {
        let sources = PemSources {
            cert: ("tls.crt", pair.cert_pem.as_bytes()),
            key: ("tls.key", pair.key_pem.as_bytes()),
            ca: None,
        };
        Arc::new(
            TlsConfiguration::from_pem(sources, Arc::new(rustls::crypto::ring::default_provider()))
                .unwrap(),
        )
    }

    #[test]
    fn test_follows_swaps() {
        let slot = Arc::new(ArcSwapOption::empty());
        let resolver = ReloadingResolver::new(Arc::clone(&slot));
        assert!(resolver.current().is_none());
        assert!(!ResolvesClientCert::has_certs(&resolver));

        let first = load(&PemPair::localhost().unwrap());
        slot.store(Some(Arc::clone(&first)));
        let served = resolver.current().unwrap();
        assert_eq!(served.cert, first.certificates()[0].cert);

        let second = load(&PemPair::localhost().unwrap());
        slot.store(Some(Arc::clone(&second)));
        assert_eq!(resolver.current().unwrap().cert, second.certificates()[0].cert);
        assert_ne!(first.certificates()[0].cert, second.certificates()[0].cert);
    }

    #[test]
    fn test_static_client_cert() {
        let tls = load(&PemPair::localhost().unwrap());
        let resolver = StaticCert::new(tls.certified_key().unwrap());
        assert!(ResolvesClientCert::has_certs(&resolver));
        assert!(ResolvesClientCert::resolve(&resolver, &[], &[]).is_some());
    }
}
