//! Gateway HTTP exchange types
//!
//! The core never talks to a socket directly. Every call goes through an
//! [`HttpExecutor`]; [`ReqwestExecutor`] is the production implementation and
//! tests substitute fakes.

pub mod executor;
pub mod server_error;

pub use executor::{tls_client_config, ReqwestExecutor};
pub use server_error::{find_error_code, ServerErrorPayload};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;

use crate::types::{GatekeeperError, Result};

/// Gateway error code header
pub const X_CA_ERROR: HeaderName = HeaderName::from_static("x-ca-err");

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

// ============================================================================
// Request / Response
// ============================================================================

/// Outgoing gateway request
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl GatewayRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// POST with an `application/x-www-form-urlencoded` body
    pub fn post_form<T: Serialize + ?Sized>(url: Url, form: &T) -> Result<Self> {
        let encoded = serde_urlencoded::to_string(form)
            .map_err(|e| GatekeeperError::protocol_with("Unable to encode form body", e))?;
        Ok(Self::new(Method::POST, url)
            .header(CONTENT_TYPE, HeaderValue::from_static(FORM_URLENCODED))
            .body(encoded))
    }

    /// Set (replace) a header
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Header value as text, if present and visible ASCII
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Response to a gateway request
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl GatewayResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// JSON body with a matching content type
    pub fn with_json(self, value: &serde_json::Value) -> Self {
        self.with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body(value.to_string())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header_str(CONTENT_TYPE.as_str())
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body as text (lossy for non-UTF-8 payloads)
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            GatekeeperError::protocol_with(format!("Malformed JSON response: {}", e), e)
        })
    }
}

// ============================================================================
// Exchange context
// ============================================================================

/// One in-flight gateway exchange
#[derive(Debug)]
pub struct RequestContext {
    request: GatewayRequest,
    response: Option<GatewayResponse>,
}

impl RequestContext {
    pub fn new(request: GatewayRequest) -> Self {
        Self {
            request,
            response: None,
        }
    }

    pub fn request(&self) -> &GatewayRequest {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut GatewayRequest {
        &mut self.request
    }

    pub fn response(&self) -> Option<&GatewayResponse> {
        self.response.as_ref()
    }

    /// Record the result of executing the request
    pub fn set_response(&mut self, response: GatewayResponse) {
        self.response = Some(response);
    }

    pub fn into_response(self) -> Option<GatewayResponse> {
        self.response
    }
}

// ============================================================================
// Executor
// ============================================================================

/// Performs one HTTP round trip
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(&self, request: GatewayRequest) -> Result<GatewayResponse>;
}
