//! Pinned trust verifier
//!
//! Combines private trust anchors, an optional public-PKI fallback and
//! public-key pinning into a single accept/reject decision for a server
//! certificate chain.
//!
//! ## Decision order
//!
//! 1. Pins (when configured): some certificate in the chain must carry a
//!    pinned public key, otherwise reject. Checked before any delegate.
//! 2. Private delegates: the first one that accepts ends the check (OR).
//! 3. No public delegates configured: reject with the private failure.
//! 4. Public delegates: every one of them must accept (AND).

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, OtherError, SignatureScheme};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::delegate::{PlatformTrust, TrustDelegate, WebPkiDelegate, WebPkiRoots};
use super::{PublicKeyHash, TrustConfiguration, TrustError};
use crate::types::{GatekeeperError, Result};

/// Server trust decision function for gateway connections.
///
/// Immutable after construction; share it across connections with `Arc`.
pub struct PinnedTrustVerifier {
    private_delegates: Vec<Arc<dyn TrustDelegate>>,
    public_delegates: Vec<Arc<dyn TrustDelegate>>,
    pinned_public_keys: HashSet<PublicKeyHash>,
    provider: Arc<CryptoProvider>,
}

impl PinnedTrustVerifier {
    /// Build a verifier using the Mozilla root program for public PKI
    pub fn new(conf: &TrustConfiguration) -> Result<Self> {
        Self::with_platform(conf, &WebPkiRoots)
    }

    /// Build a verifier with an explicit public-PKI source
    ///
    /// Fails with a configuration error when public PKI is requested but the
    /// platform has no usable trust delegate.
    pub fn with_platform(conf: &TrustConfiguration, platform: &dyn PlatformTrust) -> Result<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let mut private_delegates: Vec<Arc<dyn TrustDelegate>> = Vec::new();
        if !conf.anchors().is_empty() {
            let delegate = WebPkiDelegate::from_anchors(
                "private-trust-store",
                conf.anchors(),
                Arc::clone(&provider),
            )
            .map_err(config_error)?;
            private_delegates.push(Arc::new(delegate));
        }

        let public_delegates = if conf.trust_public_pki() {
            let delegates = platform.public_delegates(&provider).map_err(config_error)?;
            if delegates.is_empty() {
                return Err(GatekeeperError::Config(
                    "Cannot trust public PKI: no platform trust delegate found".to_string(),
                ));
            }
            delegates
        } else {
            Vec::new()
        };

        debug!(
            anchors = conf.anchors().len(),
            public_delegates = public_delegates.len(),
            pins = conf.pinned_public_keys().len(),
            "Pinned trust verifier configured"
        );

        Ok(Self {
            private_delegates,
            public_delegates,
            pinned_public_keys: conf.pinned_public_keys().iter().copied().collect(),
            provider,
        })
    }

    /// Build a verifier from ready-made delegates
    pub fn from_delegates(
        private_delegates: Vec<Arc<dyn TrustDelegate>>,
        public_delegates: Vec<Arc<dyn TrustDelegate>>,
        pinned_public_keys: impl IntoIterator<Item = PublicKeyHash>,
    ) -> Self {
        Self {
            private_delegates,
            public_delegates,
            pinned_public_keys: pinned_public_keys.into_iter().collect(),
            provider: Arc::new(rustls::crypto::ring::default_provider()),
        }
    }

    /// Decide whether a server chain (leaf first) is trusted for `server_name`
    pub fn check_server_trusted(
        &self,
        chain: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        now: UnixTime,
    ) -> std::result::Result<(), TrustError> {
        let (end_entity, intermediates) = chain.split_first().ok_or(TrustError::EmptyChain)?;

        if !self.pinned_public_keys.is_empty() && !self.chain_contains_pin(chain) {
            warn!(server = ?server_name, "Server chain carries none of the pinned public keys");
            return Err(TrustError::NoPinnedKey);
        }

        let private_failure = match self.check_private_delegates(end_entity, intermediates, server_name, now) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        if self.public_delegates.is_empty() {
            warn!(server = ?server_name, reason = %private_failure, "Server chain rejected");
            return Err(private_failure);
        }

        for delegate in &self.public_delegates {
            if let Err(source) = delegate.verify(end_entity, intermediates, server_name, now) {
                warn!(
                    server = ?server_name,
                    delegate = delegate.label(),
                    error = %source,
                    "Public PKI delegate rejected server chain"
                );
                return Err(TrustError::DelegateRejected {
                    delegate: delegate.label().to_string(),
                    source,
                });
            }
        }

        debug!(server = ?server_name, "Server chain trusted by public PKI");
        Ok(())
    }

    /// Client certificate verification is not supported by this verifier
    pub fn check_client_trusted(
        &self,
        _chain: &[CertificateDer<'_>],
    ) -> std::result::Result<(), TrustError> {
        Err(TrustError::ClientVerificationUnsupported)
    }

    /// Issuers this verifier advertises: always none
    pub fn accepted_issuers(&self) -> &[CertificateDer<'static>] {
        &[]
    }

    pub fn pinned_public_keys(&self) -> impl Iterator<Item = &PublicKeyHash> {
        self.pinned_public_keys.iter()
    }

    fn chain_contains_pin(&self, chain: &[CertificateDer<'_>]) -> bool {
        chain.iter().any(|cert| match PublicKeyHash::from_certificate(cert) {
            Ok(hash) => self.pinned_public_keys.contains(&hash),
            Err(e) => {
                debug!(error = %e, "Skipping unparseable certificate during pin check");
                false
            }
        })
    }

    fn check_private_delegates(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        now: UnixTime,
    ) -> std::result::Result<(), TrustError> {
        let mut first_failure = None;
        for delegate in &self.private_delegates {
            match delegate.verify(end_entity, intermediates, server_name, now) {
                Ok(()) => {
                    debug!(server = ?server_name, delegate = delegate.label(), "Server chain trusted");
                    return Ok(());
                }
                Err(source) => {
                    if first_failure.is_none() {
                        first_failure = Some(TrustError::DelegateRejected {
                            delegate: delegate.label().to_string(),
                            source,
                        });
                    }
                }
            }
        }
        Err(first_failure.unwrap_or(TrustError::NoTrustSource))
    }
}

fn config_error(err: TrustError) -> GatekeeperError {
    GatekeeperError::Config(err.to_string())
}

impl fmt::Debug for PinnedTrustVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedTrustVerifier")
            .field("private_delegates", &self.private_delegates)
            .field("public_delegates", &self.public_delegates)
            .field("pinned_public_keys", &self.pinned_public_keys)
            .finish_non_exhaustive()
    }
}

impl ServerCertVerifier for PinnedTrustVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        let mut chain = Vec::with_capacity(intermediates.len() + 1);
        chain.push(end_entity.clone());
        chain.extend(intermediates.iter().cloned());

        match self.check_server_trusted(&chain, server_name, now) {
            Ok(()) => Ok(ServerCertVerified::assertion()),
            Err(TrustError::DelegateRejected { source, .. }) => Err(source),
            Err(e) => Err(rustls::Error::InvalidCertificate(CertificateError::Other(
                OtherError(Arc::new(e)),
            ))),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
