//! Device key material
//!
//! The core never generates or stores keys itself. It asks a [`KeyProvider`]
//! for the device's private key and certificate chain by alias, e.g. to
//! present a client identity during the TLS handshake.
//!
//! Certificate chains are stored as numbered entries under an alias prefix:
//! `prefix1` is the leaf, `prefix2` its issuer and so on, at most
//! [`MAX_CHAIN`] entries.

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use tracing::debug;

use crate::types::{GatekeeperError, Result};

/// Maximum number of certificates kept for one chain
pub const MAX_CHAIN: usize = 9;

/// Private key plus the certificate chain that goes with it
pub struct KeyPairEntry {
    pub private_key: PrivateKeyDer<'static>,
    /// Leaf first
    pub certificate_chain: Vec<CertificateDer<'static>>,
}

impl Clone for KeyPairEntry {
    fn clone(&self) -> Self {
        Self {
            private_key: self.private_key.clone_key(),
            certificate_chain: self.certificate_chain.clone(),
        }
    }
}

impl fmt::Debug for KeyPairEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPairEntry")
            .field("private_key", &"<redacted>")
            .field("certificate_chain", &self.certificate_chain.len())
            .finish()
    }
}

/// Platform key storage
pub trait KeyProvider: Send + Sync {
    /// Key pair stored under `alias`, with the chain stored under the same
    /// alias as prefix. `None` when no key exists.
    fn get_key_pair(&self, alias: &str) -> Result<Option<KeyPairEntry>>;

    fn delete_key(&self, alias: &str) -> Result<()>;

    /// Replace the chain stored under `alias_prefix`
    fn set_certificate_chain(
        &self,
        alias_prefix: &str,
        chain: &[CertificateDer<'static>],
    ) -> Result<()>;

    fn get_certificate_chain(&self, alias_prefix: &str) -> Result<Option<Vec<CertificateDer<'static>>>>;

    fn clear_certificate_chain(&self, alias_prefix: &str) -> Result<()>;
}

/// In-process key storage for tests and desktop builds
#[derive(Default)]
pub struct InMemoryKeyProvider {
    keys: RwLock<HashMap<String, PrivateKeyDer<'static>>>,
    certificates: RwLock<HashMap<String, CertificateDer<'static>>>,
}

impl InMemoryKeyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision a private key under `alias`
    pub fn insert_private_key(&self, alias: &str, key: PrivateKeyDer<'static>) {
        self.keys
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(alias.to_string(), key);
    }
}

impl fmt::Debug for InMemoryKeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryKeyProvider").finish_non_exhaustive()
    }
}

impl KeyProvider for InMemoryKeyProvider {
    fn get_key_pair(&self, alias: &str) -> Result<Option<KeyPairEntry>> {
        let keys = self.keys.read().unwrap_or_else(|p| p.into_inner());
        let Some(key) = keys.get(alias) else {
            return Ok(None);
        };
        let chain = self.get_certificate_chain(alias)?.unwrap_or_default();
        Ok(Some(KeyPairEntry {
            private_key: key.clone_key(),
            certificate_chain: chain,
        }))
    }

    fn delete_key(&self, alias: &str) -> Result<()> {
        let removed = self
            .keys
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(alias)
            .is_some();
        debug!(alias = %alias, removed, "Deleted private key");
        Ok(())
    }

    fn set_certificate_chain(
        &self,
        alias_prefix: &str,
        chain: &[CertificateDer<'static>],
    ) -> Result<()> {
        if chain.len() > MAX_CHAIN {
            return Err(GatekeeperError::KeyStore(format!(
                "certificate chain of {} entries exceeds the maximum of {}",
                chain.len(),
                MAX_CHAIN
            )));
        }

        let mut certs = self.certificates.write().unwrap_or_else(|p| p.into_inner());
        for i in 1..=MAX_CHAIN {
            certs.remove(&format!("{}{}", alias_prefix, i));
        }
        for (i, cert) in chain.iter().enumerate() {
            certs.insert(format!("{}{}", alias_prefix, i + 1), cert.clone());
        }
        Ok(())
    }

    fn get_certificate_chain(&self, alias_prefix: &str) -> Result<Option<Vec<CertificateDer<'static>>>> {
        let certs = self.certificates.read().unwrap_or_else(|p| p.into_inner());
        let chain: Vec<_> = (1..=MAX_CHAIN)
            .map_while(|i| certs.get(&format!("{}{}", alias_prefix, i)).cloned())
            .collect();
        Ok(if chain.is_empty() { None } else { Some(chain) })
    }

    fn clear_certificate_chain(&self, alias_prefix: &str) -> Result<()> {
        self.set_certificate_chain(alias_prefix, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustls::pki_types::PrivatePkcs8KeyDer;

    fn cert(tag: u8) -> CertificateDer<'static> {
        CertificateDer::from(vec![tag; 4])
    }

    fn key() -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(vec![1u8; 16]))
    }

    #[test]
    fn test_chain_round_trip_and_replace() {
        let provider = InMemoryKeyProvider::new();
        provider
            .set_certificate_chain("device", &[cert(1), cert(2), cert(3)])
            .unwrap();
        assert_eq!(provider.get_certificate_chain("device").unwrap().unwrap().len(), 3);

        // A shorter chain must not leave stale tail entries behind
        provider.set_certificate_chain("device", &[cert(9)]).unwrap();
        assert_eq!(
            provider.get_certificate_chain("device").unwrap(),
            Some(vec![cert(9)])
        );

        provider.clear_certificate_chain("device").unwrap();
        assert_eq!(provider.get_certificate_chain("device").unwrap(), None);
    }

    #[test]
    fn test_chain_length_limit() {
        let provider = InMemoryKeyProvider::new();
        let chain: Vec<_> = (0..10).map(cert).collect();
        assert!(matches!(
            provider.set_certificate_chain("device", &chain),
            Err(GatekeeperError::KeyStore(_))
        ));
    }

    #[test]
    fn test_key_pair_lookup_and_delete() {
        let provider = InMemoryKeyProvider::new();
        assert!(provider.get_key_pair("device").unwrap().is_none());

        provider.insert_private_key("device", key());
        provider.set_certificate_chain("device", &[cert(1)]).unwrap();
        let entry = provider.get_key_pair("device").unwrap().unwrap();
        assert_eq!(entry.certificate_chain, vec![cert(1)]);

        provider.delete_key("device").unwrap();
        assert!(provider.get_key_pair("device").unwrap().is_none());
    }
}
