//! Dynamic client credentials
//!
//! One HTTP round trip that trades a registered client id (plus a device id)
//! for a per-device client id, secret and expiration. Stateless: persisting
//! the result is the caller's business.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gatekeeper::client_credentials::{ClientCredentialsEndpoint, ClientCredentialsExchanger};
//! use gatekeeper::http::ReqwestExecutor;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = ClientCredentialsEndpoint::new("https://gateway.example.com:8443".parse()?);
//! let exchanger = ClientCredentialsExchanger::new(
//!     Arc::new(ReqwestExecutor::new(reqwest::Client::new())),
//!     endpoint,
//! );
//!
//! let credentials = exchanger.exchange("8f3c1a", "", "device-42").await?;
//! println!("expires at {:?}", credentials.expires_at());
//! # Ok(())
//! # }
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderName, HeaderValue, ACCEPT};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::http::{GatewayRequest, GatewayResponse, HttpExecutor, ServerErrorPayload};
use crate::types::{GatekeeperError, Result};

/// Default endpoint path for the exchange
pub const DEFAULT_CLIENT_CREDENTIALS_PATH: &str = "/connect/client/initialize";

/// Header carrying the base64 encoded device identifier
pub const DEVICE_ID: HeaderName = HeaderName::from_static("device-id");

/// Credentials issued to this device
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    /// Epoch seconds, `0` means the credentials never expire
    #[serde(deserialize_with = "epoch_seconds")]
    pub client_expiration: i64,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>, client_expiration: i64) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            client_expiration,
        }
    }

    /// `None` only when the credentials never expire.
    ///
    /// Expirations beyond chrono's range clamp to its bounds.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.client_expiration == 0 {
            return None;
        }
        Some(
            Utc.timestamp_opt(self.client_expiration, 0)
                .single()
                .unwrap_or(if self.client_expiration > 0 {
                    DateTime::<Utc>::MAX_UTC
                } else {
                    DateTime::<Utc>::MIN_UTC
                }),
        )
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| at <= now)
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("client_expiration", &self.client_expiration)
            .finish()
    }
}

/// Accepts a JSON number or a numeric string
fn epoch_seconds<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("client_expiration is not numeric: {:?}", s))),
    }
}

/// Where the exchange is sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentialsEndpoint {
    pub base_url: Url,
    pub path: String,
}

impl ClientCredentialsEndpoint {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            path: DEFAULT_CLIENT_CREDENTIALS_PATH.to_string(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Resolve the path below the base URL, keeping any base path prefix
    pub fn url(&self) -> Result<Url> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(self.path.trim_start_matches('/')).map_err(|e| {
            GatekeeperError::protocol_with(
                format!("Unable to build client credentials URL from {:?}", self.path),
                e,
            )
        })
    }
}

#[derive(Serialize)]
struct ExchangeForm<'a> {
    client_id: &'a str,
    nonce: &'a str,
}

/// Protocol client for the client credentials exchange
#[derive(Clone)]
pub struct ClientCredentialsExchanger {
    executor: Arc<dyn HttpExecutor>,
    endpoint: ClientCredentialsEndpoint,
}

impl ClientCredentialsExchanger {
    pub fn new(executor: Arc<dyn HttpExecutor>, endpoint: ClientCredentialsEndpoint) -> Self {
        Self { executor, endpoint }
    }

    pub fn endpoint(&self) -> &ClientCredentialsEndpoint {
        &self.endpoint
    }

    /// Build the exchange request without sending it
    pub fn build_request(&self, client_id: &str, nonce: &str, device_id: &str) -> Result<GatewayRequest> {
        if client_id.is_empty() {
            return Err(GatekeeperError::InvalidArgument("client_id must not be empty".into()));
        }
        if device_id.is_empty() {
            return Err(GatekeeperError::InvalidArgument("device_id must not be empty".into()));
        }
        if !device_id.is_ascii() {
            return Err(GatekeeperError::InvalidArgument("device_id must be ASCII".into()));
        }

        let encoded_device = HeaderValue::from_str(&BASE64.encode(device_id.as_bytes()))
            .map_err(|e| GatekeeperError::protocol_with("Unable to encode device id header", e))?;

        Ok(
            GatewayRequest::post_form(self.endpoint.url()?, &ExchangeForm { client_id, nonce })?
                .header(DEVICE_ID, encoded_device)
                .header(ACCEPT, HeaderValue::from_static("application/json")),
        )
    }

    /// Exchange `client_id` for device-bound client credentials.
    ///
    /// `nonce` may be empty. Errors:
    /// - [`GatekeeperError::InvalidArgument`] for empty or non-ASCII ids
    /// - [`GatekeeperError::Transport`] when the gateway cannot be reached
    /// - [`GatekeeperError::ServerRejected`] for any status other than 200
    /// - [`GatekeeperError::ClientProtocol`] for a malformed 200 body, an
    ///   unrepresentable `client_expiration`, or an endpoint URL that cannot be built
    pub async fn exchange(&self, client_id: &str, nonce: &str, device_id: &str) -> Result<ClientCredentials> {
        let request = self.build_request(client_id, nonce, device_id)?;
        debug!(url = %request.url, "Requesting client credentials");

        let response = self.executor.execute(request).await?;
        Self::handle_response(&response)
    }

    fn handle_response(response: &GatewayResponse) -> Result<ClientCredentials> {
        if response.status != StatusCode::OK {
            let payload = ServerErrorPayload::from_response(response);
            warn!(
                status = payload.status,
                error_code = ?payload.error_code,
                error = ?payload.error,
                "Client credentials request rejected"
            );
            return Err(GatekeeperError::ServerRejected(payload));
        }

        let credentials: ClientCredentials = response.json()?;
        if credentials.client_id.is_empty() || credentials.client_secret.is_empty() {
            return Err(GatekeeperError::protocol(
                "Client credentials response has an empty client_id or client_secret",
            ));
        }
        if credentials.client_expiration != 0
            && Utc.timestamp_opt(credentials.client_expiration, 0).single().is_none()
        {
            return Err(GatekeeperError::protocol(format!(
                "client_expiration {} is not a representable timestamp",
                credentials.client_expiration
            )));
        }

        info!(
            client_id = %credentials.client_id,
            expiration = credentials.client_expiration,
            "Obtained client credentials"
        );
        Ok(credentials)
    }
}

impl std::fmt::Debug for ClientCredentialsExchanger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentialsExchanger")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}
