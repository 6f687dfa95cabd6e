//! Server certificate trust for gateway connections
//!
//! Provides:
//! - [`TrustConfiguration`]: anchors, public-PKI fallback and pins
//! - [`PinnedTrustVerifier`]: the decision function installed into rustls
//! - [`TrustDelegate`] / [`PlatformTrust`]: pluggable trust sources

pub mod configuration;
pub mod delegate;
pub mod pin;
pub mod verifier;

pub use configuration::{parse_pem_certificates, TrustConfiguration};
pub use delegate::{PlatformTrust, TrustDelegate, WebPkiDelegate, WebPkiRoots};
pub use pin::PublicKeyHash;
pub use verifier::PinnedTrustVerifier;

/// Why a certificate chain or trust configuration was refused
#[derive(Debug, Clone, thiserror::Error)]
pub enum TrustError {
    #[error("certificate chain is empty")]
    EmptyChain,

    #[error("server certificate chain did not contain any of the pinned public keys")]
    NoPinnedKey,

    #[error("trust delegate '{delegate}' rejected the chain: {source}")]
    DelegateRejected {
        delegate: String,
        #[source]
        source: rustls::Error,
    },

    #[error("no trust source is configured")]
    NoTrustSource,

    #[error("client certificate verification is not supported")]
    ClientVerificationUnsupported,

    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),

    #[error("invalid public key pin {0}")]
    InvalidPin(String),

    #[error("trust configuration: {0}")]
    Configuration(String),
}
