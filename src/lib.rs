//! Gatekeeper - client-side trust and request policy core for gateway SDKs
//!
//! Gatekeeper decides whether a gateway's TLS certificate chain is
//! trustworthy and runs every gateway call through an ordered chain of
//! request/response policies.
//!
//! ## Components
//!
//! - **Trust**: pinned-key and trust-store verification, installed into rustls
//! - **Assertions**: ordered request/response policies, OTP step-up included
//! - **Client credentials**: the device client-credentials exchange
//! - **Gateway**: the client tying the above to lifecycle events

pub mod assertion;
pub mod client_credentials;
pub mod config;
pub mod events;
pub mod gateway;
pub mod http;
pub mod platform;
pub mod session;
pub mod trust;
pub mod types;

pub use assertion::{Assertion, AssertionChain, AssertionContext, OtpAssertion};
pub use client_credentials::{ClientCredentials, ClientCredentialsExchanger};
pub use config::{Args, GatewayConfig};
pub use gateway::GatewayClient;
pub use trust::{PinnedTrustVerifier, TrustConfiguration};
pub use types::{GatekeeperError, Result};
