//! Gateway error envelope
//!
//! Non-success answers carry a numeric error code in the `x-ca-err` header
//! and an OAuth-style JSON body (`error`, `error_description`). Either part
//! may be missing; parsing never fails, it only leaves fields empty.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{GatewayResponse, X_CA_ERROR};

/// Parsed server error payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerErrorPayload {
    /// HTTP status code
    pub status: u16,
    /// Gateway error code (`x-ca-err` header or `error_code` body field)
    pub error_code: Option<i64>,
    /// OAuth error identifier
    pub error: Option<String>,
    /// Human readable description
    pub error_description: Option<String>,
    pub content_type: Option<String>,
    /// Raw body text
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_code: Option<serde_json::Value>,
}

impl ServerErrorPayload {
    pub fn from_response(response: &GatewayResponse) -> Self {
        let envelope: ErrorEnvelope = serde_json::from_slice(&response.body).unwrap_or_default();

        Self {
            status: response.status.as_u16(),
            error_code: header_error_code(response)
                .or_else(|| envelope.error_code.as_ref().and_then(numeric)),
            error: envelope.error,
            error_description: envelope.error_description,
            content_type: response.content_type().map(str::to_string),
            body: response.text().into_owned(),
        }
    }
}

impl fmt::Display for ServerErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", self.status)?;
        if let Some(code) = self.error_code {
            write!(f, " (x-ca-err {})", code)?;
        }
        match (&self.error, &self.error_description) {
            (Some(error), Some(description)) => write!(f, ": {}: {}", error, description),
            (Some(error), None) => write!(f, ": {}", error),
            (None, Some(description)) => write!(f, ": {}", description),
            (None, None) => Ok(()),
        }
    }
}

/// Best-effort extraction of the gateway's numeric error code
///
/// Looks at the `x-ca-err` header first, then an `error_code` field in a
/// JSON body. Returns `None` when neither yields a number.
pub fn find_error_code(response: &GatewayResponse) -> Option<i64> {
    header_error_code(response).or_else(|| {
        serde_json::from_slice::<ErrorEnvelope>(&response.body)
            .ok()
            .and_then(|envelope| envelope.error_code.as_ref().and_then(numeric))
    })
}

fn header_error_code(response: &GatewayResponse) -> Option<i64> {
    response
        .header_str(X_CA_ERROR.as_str())
        .and_then(|v| v.trim().parse().ok())
}

fn numeric(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
