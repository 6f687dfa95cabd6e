//! Gateway client
//!
//! Ties the assertion chain, the HTTP executor and the session together and
//! implements the higher-level session flows that announce lifecycle events.

use std::sync::{Arc, RwLock};
use tracing::info;

use crate::assertion::{AssertionChain, AssertionContext};
use crate::client_credentials::{ClientCredentials, ClientCredentialsEndpoint, ClientCredentialsExchanger};
use crate::events::LifecycleEvent;
use crate::http::{GatewayRequest, GatewayResponse, HttpExecutor};
use crate::types::Result;

struct Connection {
    executor: Arc<dyn HttpExecutor>,
    endpoint: ClientCredentialsEndpoint,
}

pub struct GatewayClient {
    chain: AssertionChain,
    connection: RwLock<Connection>,
}

impl GatewayClient {
    pub fn new(
        chain: AssertionChain,
        executor: Arc<dyn HttpExecutor>,
        endpoint: ClientCredentialsEndpoint,
    ) -> Self {
        Self {
            chain,
            connection: RwLock::new(Connection { executor, endpoint }),
        }
    }

    pub fn context(&self) -> &AssertionContext {
        self.chain.context()
    }

    fn executor(&self) -> Arc<dyn HttpExecutor> {
        let connection = self.connection.read().unwrap_or_else(|p| p.into_inner());
        Arc::clone(&connection.executor)
    }

    pub fn endpoint(&self) -> ClientCredentialsEndpoint {
        self.connection
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .endpoint
            .clone()
    }

    /// Run one request through the assertion chain
    pub async fn execute(&self, request: GatewayRequest) -> Result<GatewayResponse> {
        let executor = self.executor();
        self.chain.execute(executor.as_ref(), request).await
    }

    /// Obtain client credentials for this device
    pub async fn register_client(&self, client_id: &str, nonce: &str, device_id: &str) -> Result<ClientCredentials> {
        let exchanger = ClientCredentialsExchanger::new(self.executor(), self.endpoint());
        exchanger.exchange(client_id, nonce, device_id).await
    }

    /// End the user session
    pub fn logout(&self) {
        self.context().session.clear();
        info!("Logged out");
        self.publish(LifecycleEvent::Logout);
    }

    /// Remove the device identity from the key store
    pub fn deregister(&self) -> Result<()> {
        self.remove_identity()?;
        info!("Device deregistered");
        self.publish(LifecycleEvent::DeRegister);
        Ok(())
    }

    /// Drop session state and key material without telling the gateway
    pub fn reset_locally(&self) -> Result<()> {
        self.context().session.clear();
        self.remove_identity()?;
        info!("Local state reset");
        self.publish(LifecycleEvent::ResetLocally);
        Ok(())
    }

    /// Point the client at another gateway.
    ///
    /// Listeners see `BeforeGatewaySwitch` while the old connection is still
    /// in place and `AfterGatewaySwitch` once the new one is.
    pub fn switch_gateway(&self, executor: Arc<dyn HttpExecutor>, endpoint: ClientCredentialsEndpoint) {
        self.publish(LifecycleEvent::BeforeGatewaySwitch);
        {
            let mut connection = self.connection.write().unwrap_or_else(|p| p.into_inner());
            info!(from = %connection.endpoint.base_url, to = %endpoint.base_url, "Switching gateway");
            *connection = Connection { executor, endpoint };
        }
        self.publish(LifecycleEvent::AfterGatewaySwitch);
    }

    fn remove_identity(&self) -> Result<()> {
        let platform = &self.context().platform;
        platform.key_provider.delete_key(&platform.identity_alias)?;
        platform
            .key_provider
            .clear_certificate_chain(&platform.identity_alias)
    }

    fn publish(&self, event: LifecycleEvent) {
        self.context().platform.events.publish(event);
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("chain", &self.chain)
            .field("endpoint", &self.endpoint())
            .finish()
    }
}
