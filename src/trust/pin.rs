//! Public-key pins
//!
//! A pin is the SHA-256 digest of a certificate's DER-encoded
//! `SubjectPublicKeyInfo`. Pins survive certificate renewal as long as the
//! server keeps its key pair.
//!
//! ## Accepted text forms
//!
//! - `sha256/<base64>` (HPKP style, also the `Display` form)
//! - `<base64>` (standard alphabet, 44 chars)
//! - `<hex>` (64 chars)

use base64::Engine;
use rustls::pki_types::CertificateDer;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use super::TrustError;

const PIN_PREFIX: &str = "sha256/";

/// SHA-256 hash of a public key, used for certificate pinning
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKeyHash([u8; 32]);

impl PublicKeyHash {
    /// Wrap a raw 32-byte digest
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash a DER-encoded `SubjectPublicKeyInfo`
    pub fn from_spki_der(spki_der: &[u8]) -> Self {
        Self(Sha256::digest(spki_der).into())
    }

    /// Hash the public key of a DER-encoded X.509 certificate
    pub fn from_certificate(cert: &CertificateDer<'_>) -> Result<Self, TrustError> {
        let (_, parsed) = x509_parser::parse_x509_certificate(cert.as_ref())
            .map_err(|e| TrustError::MalformedCertificate(e.to_string()))?;
        Ok(Self::from_spki_der(parsed.tbs_certificate.subject_pki.raw))
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PublicKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            PIN_PREFIX,
            base64::engine::general_purpose::STANDARD.encode(self.0)
        )
    }
}

impl fmt::Debug for PublicKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyHash({})", self)
    }
}

impl FromStr for PublicKeyHash {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let raw = s.strip_prefix(PIN_PREFIX).unwrap_or(s);

        let bytes = if raw.len() == 64 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            hex::decode(raw).map_err(|e| TrustError::InvalidPin(format!("{}: {}", s, e)))?
        } else {
            base64::engine::general_purpose::STANDARD
                .decode(raw)
                .map_err(|e| TrustError::InvalidPin(format!("{}: {}", s, e)))?
        };

        let digest: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            TrustError::InvalidPin(format!("{}: expected 32 bytes, got {}", s, b.len()))
        })?;
        Ok(Self(digest))
    }
}

impl Serialize for PublicKeyHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PublicKeyHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
