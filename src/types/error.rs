//! Error types for Gatekeeper

use crate::assertion::otp::OtpChallenge;
use crate::http::ServerErrorPayload;
use crate::trust::TrustError;

/// Boxed source error carried by client-side failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for Gatekeeper operations
#[derive(Debug, thiserror::Error)]
pub enum GatekeeperError {
    /// Pin mismatch or delegate rejection. Fatal for the connection attempt.
    #[error("Trust rejected: {0}")]
    TrustRejected(#[from] TrustError),

    /// Unrecoverable configuration problem
    #[error("Configuration error: {0}")]
    Config(String),

    /// A request-phase assertion rejected before any network call was made
    #[error("Assertion '{assertion}' aborted the request: {source}")]
    ChainAborted {
        assertion: String,
        #[source]
        source: Box<GatekeeperError>,
    },

    /// The gateway asked for step-up OTP verification
    #[error("OTP challenge: {0}")]
    OtpChallenge(Box<OtpChallenge>),

    /// Non-200 answer from a protocol exchange
    #[error("Server rejected request: {0}")]
    ServerRejected(ServerErrorPayload),

    /// Malformed response, unparseable JSON or malformed URL
    #[error("Client protocol error: {message}")]
    ClientProtocol {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The server could not be reached
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Key store error: {0}")]
    KeyStore(String),
}

impl GatekeeperError {
    /// Client protocol error without an underlying cause
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ClientProtocol {
            message: message.into(),
            source: None,
        }
    }

    /// Client protocol error wrapping an underlying cause
    pub fn protocol_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ClientProtocol {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Transport error wrapping an underlying cause
    pub fn transport(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Failures caused on this side of the wire (bad input, version mismatch,
    /// unreachable server)
    pub fn is_client_side(&self) -> bool {
        matches!(
            self,
            Self::ClientProtocol { .. } | Self::Transport { .. } | Self::InvalidArgument(_)
        )
    }

    /// Failures reported by the gateway itself
    pub fn is_server_side(&self) -> bool {
        matches!(self, Self::ServerRejected(_) | Self::OtpChallenge(_))
    }

    /// The OTP challenge carried by this error, looking through a chain abort
    pub fn otp_challenge(&self) -> Option<&OtpChallenge> {
        match self {
            Self::OtpChallenge(challenge) => Some(challenge),
            Self::ChainAborted { source, .. } => source.otp_challenge(),
            _ => None,
        }
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for GatekeeperError {
    fn from(err: std::io::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<serde_json::Error> for GatekeeperError {
    fn from(err: serde_json::Error) -> Self {
        Self::protocol_with(format!("JSON error: {}", err), err)
    }
}

impl From<reqwest::Error> for GatekeeperError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::protocol_with(format!("Invalid request: {}", err), err)
        } else {
            Self::transport(format!("HTTP error: {}", err), err)
        }
    }
}

/// Result type alias for Gatekeeper operations
pub type Result<T> = std::result::Result<T, GatekeeperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_and_server_side_classification() {
        assert!(GatekeeperError::protocol("bad json").is_client_side());
        assert!(GatekeeperError::InvalidArgument("empty".into()).is_client_side());
        assert!(!GatekeeperError::Config("x".into()).is_client_side());

        let rejected = GatekeeperError::ServerRejected(ServerErrorPayload::default());
        assert!(rejected.is_server_side());
        assert!(!rejected.is_client_side());
    }

    #[test]
    fn test_chain_abort_display_names_assertion() {
        let err = GatekeeperError::ChainAborted {
            assertion: "credentials".into(),
            source: Box::new(GatekeeperError::KeyStore("locked".into())),
        };
        assert_eq!(
            err.to_string(),
            "Assertion 'credentials' aborted the request: Key store error: locked"
        );
    }
}
