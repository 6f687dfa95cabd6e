//! Shared types for Gatekeeper

pub mod error;

pub use error::{BoxError, GatekeeperError, Result};
