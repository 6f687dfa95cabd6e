//! Configuration for Gatekeeper
//!
//! CLI arguments come from clap (with environment fallbacks); the gateway
//! connection itself is described by a JSON file loaded into
//! [`GatewayConfig`].

use clap::{Parser, Subcommand};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client_credentials::{ClientCredentialsEndpoint, DEFAULT_CLIENT_CREDENTIALS_PATH};
use crate::platform::DEFAULT_IDENTITY_ALIAS;
use crate::trust::{PublicKeyHash, TrustConfiguration};
use crate::types::{GatekeeperError, Result};

/// Gatekeeper - gateway trust and client registration tool
#[derive(Parser, Debug, Clone)]
#[command(name = "gatekeeper")]
#[command(about = "Certificate pinning and client credential tooling for mobile gateways")]
pub struct Args {
    /// Gateway configuration file (JSON)
    #[arg(long, env = "GATEKEEPER_CONFIG", default_value = "gatekeeper.json")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Print the public key pin of every certificate in a PEM file
    Pin {
        /// PEM file with one or more certificates
        pem: PathBuf,
    },

    /// Check a certificate chain against the configured trust sources
    Verify {
        /// PEM file with the chain, leaf first
        chain: PathBuf,

        /// DNS name the chain must be valid for
        #[arg(long)]
        server_name: String,
    },

    /// Obtain client credentials from the configured gateway
    Register {
        /// Registered client id
        #[arg(long, env = "GATEKEEPER_CLIENT_ID")]
        client_id: String,

        /// Device identifier (ASCII)
        #[arg(long, env = "GATEKEEPER_DEVICE_ID")]
        device_id: String,

        #[arg(long, default_value = "")]
        nonce: String,
    },
}

fn default_client_credentials_path() -> String {
    DEFAULT_CLIENT_CREDENTIALS_PATH.to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_identity_alias() -> String {
    DEFAULT_IDENTITY_ALIAS.to_string()
}

/// Where the gateway lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub base_url: String,

    #[serde(default = "default_client_credentials_path")]
    pub client_credentials_path: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Which certificates the gateway connection trusts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustSection {
    /// PEM encoded private trust anchors
    #[serde(default)]
    pub trusted_cert_pem: Vec<String>,

    #[serde(default)]
    pub trust_public_pki: bool,

    #[serde(default)]
    pub pinned_public_keys: Vec<PublicKeyHash>,
}

/// Gateway connection file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub server: ServerConfig,

    #[serde(default)]
    pub trust: TrustSection,

    /// Key alias of the device identity used for mutual TLS
    #[serde(default = "default_identity_alias")]
    pub identity_alias: String,
}

impl GatewayConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            GatekeeperError::Config(format!("Unable to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| GatekeeperError::Config(format!("Invalid gateway configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let base_url = self.base_url()?;
        if !matches!(base_url.scheme(), "https" | "http") {
            return Err(GatekeeperError::Config(format!(
                "server.base_url must be http(s), got {}",
                base_url.scheme()
            )));
        }

        if self.server.timeout_ms == 0 {
            return Err(GatekeeperError::Config("server.timeout_ms must be positive".into()));
        }

        // Pins narrow trust, they never grant it on their own
        if self.trust.trusted_cert_pem.is_empty() && !self.trust.trust_public_pki {
            return Err(GatekeeperError::Config(
                "trust section needs trusted_cert_pem or trust_public_pki".into(),
            ));
        }

        if self.identity_alias.is_empty() {
            return Err(GatekeeperError::Config("identity_alias must not be empty".into()));
        }

        Ok(())
    }

    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.server.base_url).map_err(|e| {
            GatekeeperError::Config(format!("Invalid server.base_url {:?}: {}", self.server.base_url, e))
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.server.timeout_ms)
    }

    pub fn endpoint(&self) -> Result<ClientCredentialsEndpoint> {
        Ok(ClientCredentialsEndpoint::new(self.base_url()?)
            .with_path(self.server.client_credentials_path.clone()))
    }

    /// Build the trust configuration, parsing every PEM anchor
    pub fn trust_configuration(&self) -> Result<TrustConfiguration> {
        let mut trust = TrustConfiguration::new().with_public_pki(self.trust.trust_public_pki);
        for pem in &self.trust.trusted_cert_pem {
            trust = trust.with_anchors_pem(pem)?;
        }
        for pin in &self.trust.pinned_public_keys {
            trust = trust.with_pin(*pin);
        }
        Ok(trust)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let config = GatewayConfig::from_json(
            r#"{
                "server": { "base_url": "https://gateway.example.com:8443" },
                "trust": { "trust_public_pki": true }
            }"#,
        )
        .unwrap();

        assert_eq!(config.server.client_credentials_path, "/connect/client/initialize");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.identity_alias, DEFAULT_IDENTITY_ALIAS);
        assert_eq!(
            config.endpoint().unwrap().url().unwrap().as_str(),
            "https://gateway.example.com:8443/connect/client/initialize"
        );
        assert!(config.trust_configuration().unwrap().trust_public_pki());
    }

    #[test]
    fn test_rejects_config_without_trust_source() {
        let err = GatewayConfig::from_json(r#"{ "server": { "base_url": "https://gw.example.com" } }"#)
            .unwrap_err();
        assert!(matches!(err, GatekeeperError::Config(_)));
    }

    #[test]
    fn test_rejects_bad_pin_and_scheme() {
        let bad_pin = r#"{
            "server": { "base_url": "https://gw.example.com" },
            "trust": { "trust_public_pki": true, "pinned_public_keys": ["not-a-pin"] }
        }"#;
        assert!(GatewayConfig::from_json(bad_pin).is_err());

        let bad_scheme = r#"{
            "server": { "base_url": "ftp://gw.example.com" },
            "trust": { "trust_public_pki": true }
        }"#;
        assert!(GatewayConfig::from_json(bad_scheme).is_err());
    }

    #[test]
    fn test_args_parse_register() {
        let args = Args::try_parse_from([
            "gatekeeper",
            "--config",
            "gw.json",
            "register",
            "--client-id",
            "abc",
            "--device-id",
            "device-42",
        ])
        .unwrap();
        match args.command {
            Commands::Register {
                client_id,
                device_id,
                nonce,
            } => {
                assert_eq!(client_id, "abc");
                assert_eq!(device_id, "device-42");
                assert_eq!(nonce, "");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
