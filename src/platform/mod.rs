//! Platform collaborators
//!
//! Narrow interfaces to the things the core consults but does not own:
//! key storage, user consent and the lifecycle event bus.

pub mod consent;
pub mod key_provider;

pub use consent::{consent_request, ConsentDecision, ConsentHandler, ConsentReceiver, OneShotConsent};
pub use key_provider::{InMemoryKeyProvider, KeyPairEntry, KeyProvider, MAX_CHAIN};

use std::sync::Arc;

use crate::events::{EventPublisher, NoopPublisher};
use crate::types::Result;

/// Default key alias for the device's TLS client identity
pub const DEFAULT_IDENTITY_ALIAS: &str = "gatekeeper.device";

/// Platform services handed to assertions at initialization
#[derive(Clone)]
pub struct PlatformContext {
    pub key_provider: Arc<dyn KeyProvider>,
    pub events: Arc<dyn EventPublisher>,
    pub identity_alias: String,
}

impl PlatformContext {
    pub fn new(key_provider: Arc<dyn KeyProvider>, events: Arc<dyn EventPublisher>) -> Self {
        Self {
            key_provider,
            events,
            identity_alias: DEFAULT_IDENTITY_ALIAS.to_string(),
        }
    }

    pub fn with_identity_alias(mut self, alias: impl Into<String>) -> Self {
        self.identity_alias = alias.into();
        self
    }

    /// Device identity for mutual TLS, if one has been provisioned
    pub fn device_identity(&self) -> Result<Option<KeyPairEntry>> {
        let entry = self.key_provider.get_key_pair(&self.identity_alias)?;
        Ok(entry.filter(|e| !e.certificate_chain.is_empty()))
    }
}

impl Default for PlatformContext {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryKeyProvider::new()), Arc::new(NoopPublisher))
    }
}

impl std::fmt::Debug for PlatformContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformContext")
            .field("identity_alias", &self.identity_alias)
            .finish_non_exhaustive()
    }
}
