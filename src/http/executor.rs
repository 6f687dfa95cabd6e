//! reqwest-backed executor
//!
//! Builds a rustls client configuration around the [`PinnedTrustVerifier`]
//! (and an optional device identity for mutual TLS) and hands it to reqwest.
//! Timeouts live here, not in the assertion chain.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{GatewayRequest, GatewayResponse, HttpExecutor};
use crate::platform::KeyPairEntry;
use crate::trust::PinnedTrustVerifier;
use crate::types::{GatekeeperError, Result};

/// Build the rustls client configuration used for gateway connections
pub fn tls_client_config(
    verifier: Arc<PinnedTrustVerifier>,
    identity: Option<KeyPairEntry>,
) -> Result<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| GatekeeperError::Config(format!("TLS protocol versions: {}", e)))?
        .dangerous()
        .with_custom_certificate_verifier(verifier);

    match identity {
        Some(identity) => builder
            .with_client_auth_cert(identity.certificate_chain, identity.private_key)
            .map_err(|e| GatekeeperError::Config(format!("Device identity unusable for TLS: {}", e))),
        None => Ok(builder.with_no_client_auth()),
    }
}

/// Production executor over a reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    /// Wrap an already configured client
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Client whose TLS trust is decided by `verifier`
    pub fn with_trust(
        verifier: Arc<PinnedTrustVerifier>,
        identity: Option<KeyPairEntry>,
        timeout: Duration,
    ) -> Result<Self> {
        let tls = tls_client_config(verifier, identity)?;
        let client = reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .timeout(timeout)
            .build()
            .map_err(|e| GatekeeperError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: GatewayRequest) -> Result<GatewayResponse> {
        debug!(method = %request.method, url = %request.url, "Executing gateway request");

        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        debug!(status = status.as_u16(), bytes = body.len(), "Gateway response received");

        Ok(GatewayResponse {
            status,
            headers,
            body,
        })
    }
}
