//! Trust configuration
//!
//! Immutable description of what a gateway connection trusts: private trust
//! anchors, an optional public-PKI fallback and a set of public-key pins.
//! Consumed once to build a [`PinnedTrustVerifier`](super::PinnedTrustVerifier).

use rustls::pki_types::CertificateDer;
use x509_parser::pem::Pem;

use super::{PublicKeyHash, TrustError};

/// Trusted certificate configuration for one gateway
#[derive(Debug, Clone, Default)]
pub struct TrustConfiguration {
    anchors: Vec<CertificateDer<'static>>,
    trust_public_pki: bool,
    pinned_public_keys: Vec<PublicKeyHash>,
}

impl TrustConfiguration {
    /// Empty configuration (trusts nothing until anchors or public PKI are added)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a private trust anchor
    pub fn with_anchor(mut self, anchor: CertificateDer<'static>) -> Self {
        self.anchors.push(anchor);
        self
    }

    /// Add every certificate found in a PEM bundle as a private trust anchor
    pub fn with_anchors_pem(mut self, pem: &str) -> Result<Self, TrustError> {
        self.anchors.extend(parse_pem_certificates(pem)?);
        Ok(self)
    }

    /// Also accept chains that the platform's public PKI trusts
    pub fn with_public_pki(mut self, trust: bool) -> Self {
        self.trust_public_pki = trust;
        self
    }

    /// Require one of the chain's public keys to hash to this pin
    pub fn with_pin(mut self, pin: PublicKeyHash) -> Self {
        if !self.pinned_public_keys.contains(&pin) {
            self.pinned_public_keys.push(pin);
        }
        self
    }

    pub fn anchors(&self) -> &[CertificateDer<'static>] {
        &self.anchors
    }

    pub fn trust_public_pki(&self) -> bool {
        self.trust_public_pki
    }

    pub fn pinned_public_keys(&self) -> &[PublicKeyHash] {
        &self.pinned_public_keys
    }
}

/// Parse every `CERTIFICATE` block of a PEM bundle into DER
pub fn parse_pem_certificates(pem: &str) -> Result<Vec<CertificateDer<'static>>, TrustError> {
    let mut certs = Vec::new();
    for block in Pem::iter_from_buffer(pem.as_bytes()) {
        let block = block.map_err(|e| TrustError::MalformedCertificate(e.to_string()))?;
        if block.label == "CERTIFICATE" {
            certs.push(CertificateDer::from(block.contents));
        }
    }
    if certs.is_empty() {
        return Err(TrustError::MalformedCertificate(
            "no CERTIFICATE block found in PEM input".to_string(),
        ));
    }
    Ok(certs)
}
