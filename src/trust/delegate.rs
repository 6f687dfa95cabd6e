//! Trust delegates
//!
//! A delegate is one trust source that can say yes or no to a presented
//! chain. The verifier combines several of them:
//!
//! - **Private** delegates are built from the configured trust anchors
//! - **Public** delegates come from a [`PlatformTrust`] (public PKI roots)

use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::RootCertStore;
use std::fmt;
use std::sync::Arc;

use super::TrustError;

/// One trust source consulted by the verifier
pub trait TrustDelegate: fmt::Debug + Send + Sync {
    /// Short label used in logs and rejection reasons
    fn label(&self) -> &str;

    /// Accept or reject the chain for the given server name
    fn verify(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        now: UnixTime,
    ) -> Result<(), rustls::Error>;
}

/// Delegate backed by rustls' webpki path validation over a root store
pub struct WebPkiDelegate {
    label: String,
    inner: Arc<WebPkiServerVerifier>,
}

impl WebPkiDelegate {
    /// Build a delegate over the given roots
    ///
    /// Fails when the root store is empty or the provider is unusable.
    pub fn new(
        label: impl Into<String>,
        roots: RootCertStore,
        provider: Arc<CryptoProvider>,
    ) -> Result<Self, TrustError> {
        let label = label.into();
        let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .map_err(|e| TrustError::Configuration(format!("{}: {}", label, e)))?;
        Ok(Self { label, inner })
    }

    /// Build a delegate whose roots are the given private anchors
    pub fn from_anchors(
        label: impl Into<String>,
        anchors: &[CertificateDer<'static>],
        provider: Arc<CryptoProvider>,
    ) -> Result<Self, TrustError> {
        let label = label.into();
        let mut roots = RootCertStore::empty();
        for (i, anchor) in anchors.iter().enumerate() {
            roots.add(anchor.clone()).map_err(|e| {
                TrustError::Configuration(format!("{}: anchor #{} unusable: {}", label, i + 1, e))
            })?;
        }
        Self::new(label, roots, provider)
    }
}

impl fmt::Debug for WebPkiDelegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebPkiDelegate")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl TrustDelegate for WebPkiDelegate {
    fn label(&self) -> &str {
        &self.label
    }

    fn verify(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        now: UnixTime,
    ) -> Result<(), rustls::Error> {
        use rustls::client::danger::ServerCertVerifier;

        self.inner
            .verify_server_cert(end_entity, intermediates, server_name, &[], now)
            .map(|_| ())
    }
}

/// Source of the platform's public-PKI trust delegates
pub trait PlatformTrust: Send + Sync {
    /// Every usable public trust delegate; empty when the platform has none
    fn public_delegates(
        &self,
        provider: &Arc<CryptoProvider>,
    ) -> Result<Vec<Arc<dyn TrustDelegate>>, TrustError>;
}

/// Public PKI from the Mozilla root program (`webpki-roots`)
#[derive(Debug, Clone, Copy, Default)]
pub struct WebPkiRoots;

impl PlatformTrust for WebPkiRoots {
    fn public_delegates(
        &self,
        provider: &Arc<CryptoProvider>,
    ) -> Result<Vec<Arc<dyn TrustDelegate>>, TrustError> {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        if roots.is_empty() {
            return Ok(Vec::new());
        }
        let delegate = WebPkiDelegate::new("public-pki", roots, Arc::clone(provider))?;
        Ok(vec![Arc::new(delegate)])
    }
}
