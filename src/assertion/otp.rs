//! One-time password step-up
//!
//! On the way out, a pending OTP is consumed from the session and sent in the
//! `X-OTP` header. On the way back, a 400/401/403 answer that says an OTP is
//! required (or that the one sent was invalid) becomes an
//! [`OtpChallenge`] error for the UI to act on. Nothing is retried here.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use super::{Assertion, AssertionContext};
use crate::http::{find_error_code, GatewayRequest, GatewayResponse, RequestContext, X_CA_ERROR};
use crate::types::{GatekeeperError, Result};

pub const X_OTP: HeaderName = HeaderName::from_static("x-otp");
pub const X_OTP_CHANNEL: HeaderName = HeaderName::from_static("x-otp-channel");
pub const X_OTP_RETRY: HeaderName = HeaderName::from_static("x-otp-retry");
pub const X_OTP_RETRY_INTERVAL: HeaderName = HeaderName::from_static("x-otp-retry-interval");

/// Value of the `X-OTP` response header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpState {
    /// Header absent
    NotRequired,
    /// `required`, any case
    Required,
    /// Present with some other value
    Other,
}

/// OTP failure reported through `x-ca-err`, keyed on the last three digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpErrorCode {
    OtpInvalid,
    OtpRetryLimitExceeded,
    OtpExpired,
    OtpRetryBarred,
    InvalidChannel,
    Unknown,
}

impl OtpErrorCode {
    pub fn from_header_value(value: &str) -> Self {
        let value = value.trim();
        let suffix = value
            .char_indices()
            .rev()
            .nth(2)
            .map(|(i, _)| &value[i..])
            .unwrap_or(value);

        match suffix {
            "140" => Self::OtpInvalid,
            "142" => Self::OtpRetryLimitExceeded,
            "143" => Self::OtpExpired,
            "144" => Self::OtpRetryBarred,
            "145" => Self::InvalidChannel,
            _ => Self::Unknown,
        }
    }
}

/// OTP-related response headers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpResponseHeaders {
    pub http_status: u16,
    pub otp_state: OtpState,
    /// `None` when `x-ca-err` is absent
    pub error_code: Option<OtpErrorCode>,
    /// Delivery channels offered by the gateway
    pub channels: Vec<String>,
    /// Remaining attempts
    pub retry: Option<u32>,
    /// Seconds to wait before the next attempt
    pub retry_interval: Option<u64>,
}

impl OtpResponseHeaders {
    pub fn from_headers(status: StatusCode, headers: &HeaderMap) -> Self {
        let text = |name: &HeaderName| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);

        let otp_state = match headers.get(&X_OTP) {
            None => OtpState::NotRequired,
            Some(v) => match v.to_str() {
                Ok(s) if s.trim().eq_ignore_ascii_case("required") => OtpState::Required,
                _ => OtpState::Other,
            },
        };

        let channels = text(&X_OTP_CHANNEL)
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            http_status: status.as_u16(),
            otp_state,
            error_code: text(&X_CA_ERROR).map(OtpErrorCode::from_header_value),
            channels,
            retry: text(&X_OTP_RETRY).and_then(|v| v.parse().ok()),
            retry_interval: text(&X_OTP_RETRY_INTERVAL).and_then(|v| v.parse().ok()),
        }
    }
}

/// The gateway wants the user to (re-)enter a one-time password
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpChallenge {
    /// Numeric gateway error code, `None` when it could not be determined
    pub error_code: Option<i64>,
    pub status: u16,
    pub content_type: Option<String>,
    pub description: Option<String>,
    pub headers: OtpResponseHeaders,
}

impl fmt::Display for OtpChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {} ({:?})", self.status, self.headers.otp_state)?;
        if let Some(code) = self.error_code {
            write!(f, " code {}", code)?;
        }
        if let Some(description) = &self.description {
            write!(f, ": {}", description)?;
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct OtpErrorBody {
    error_description: Option<String>,
}

fn describe(response: &GatewayResponse) -> Option<String> {
    if let Ok(OtpErrorBody {
        error_description: Some(description),
    }) = serde_json::from_slice(&response.body)
    {
        return Some(description);
    }
    let raw = response.text();
    let raw = raw.trim();
    (!raw.is_empty()).then(|| raw.to_string())
}

/// Sends pending OTPs and raises [`OtpChallenge`] on step-up answers
#[derive(Debug, Default, Clone, Copy)]
pub struct OtpAssertion;

impl OtpAssertion {
    pub const NAME: &'static str = "otp";

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Assertion for OtpAssertion {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn process_request(&self, ctx: &AssertionContext, exchange: &mut RequestContext) -> Result<()> {
        let Some(otp) = ctx.session.take_otp().filter(|o| !o.is_empty()) else {
            return Ok(());
        };

        let value = HeaderValue::from_str(&otp)
            .map_err(|e| GatekeeperError::protocol_with("OTP is not a valid header value", e))?;
        exchange.request_mut().headers.insert(X_OTP, value);
        debug!(url = %exchange.request().url, "Attached one-time password");
        Ok(())
    }

    async fn process_response(
        &self,
        _ctx: &AssertionContext,
        request: &GatewayRequest,
        response: &GatewayResponse,
    ) -> Result<()> {
        if !matches!(
            response.status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Ok(());
        }

        let headers = OtpResponseHeaders::from_headers(response.status, &response.headers);
        if headers.otp_state != OtpState::Required
            && headers.error_code != Some(OtpErrorCode::OtpInvalid)
        {
            return Ok(());
        }

        let challenge = OtpChallenge {
            error_code: find_error_code(response),
            status: response.status.as_u16(),
            content_type: response.content_type().map(str::to_string),
            description: describe(response),
            headers,
        };
        info!(
            url = %request.url,
            status = challenge.status,
            state = ?challenge.headers.otp_state,
            "Gateway requested OTP verification"
        );
        Err(GatekeeperError::OtpChallenge(Box::new(challenge)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Url;
    use serde_json::json;

    fn exchange() -> RequestContext {
        RequestContext::new(GatewayRequest::get(
            Url::parse("https://gateway.example.com/protected/resource").unwrap(),
        ))
    }

    #[test]
    fn test_error_code_suffixes() {
        assert_eq!(OtpErrorCode::from_header_value("8000140"), OtpErrorCode::OtpInvalid);
        assert_eq!(OtpErrorCode::from_header_value("3000142"), OtpErrorCode::OtpRetryLimitExceeded);
        assert_eq!(OtpErrorCode::from_header_value(" 143 "), OtpErrorCode::OtpExpired);
        assert_eq!(OtpErrorCode::from_header_value("1000144"), OtpErrorCode::OtpRetryBarred);
        assert_eq!(OtpErrorCode::from_header_value("1000145"), OtpErrorCode::InvalidChannel);
        assert_eq!(OtpErrorCode::from_header_value("1000201"), OtpErrorCode::Unknown);
        assert_eq!(OtpErrorCode::from_header_value("40"), OtpErrorCode::Unknown);
    }

    #[test]
    fn test_response_headers_parse() {
        let mut headers = HeaderMap::new();
        headers.insert(X_OTP, HeaderValue::from_static("REQUIRED"));
        headers.insert(X_OTP_CHANNEL, HeaderValue::from_static("EMAIL, SMS"));
        headers.insert(X_OTP_RETRY, HeaderValue::from_static("2"));
        headers.insert(X_OTP_RETRY_INTERVAL, HeaderValue::from_static("30"));

        let parsed = OtpResponseHeaders::from_headers(StatusCode::UNAUTHORIZED, &headers);
        assert_eq!(parsed.http_status, 401);
        assert_eq!(parsed.otp_state, OtpState::Required);
        assert_eq!(parsed.error_code, None);
        assert_eq!(parsed.channels, vec!["EMAIL", "SMS"]);
        assert_eq!(parsed.retry, Some(2));
        assert_eq!(parsed.retry_interval, Some(30));

        headers.insert(X_OTP, HeaderValue::from_static("generated"));
        let parsed = OtpResponseHeaders::from_headers(StatusCode::UNAUTHORIZED, &headers);
        assert_eq!(parsed.otp_state, OtpState::Other);
        assert_eq!(
            OtpResponseHeaders::from_headers(StatusCode::OK, &HeaderMap::new()).otp_state,
            OtpState::NotRequired
        );
    }

    #[tokio::test]
    async fn test_otp_sent_once() {
        let ctx = AssertionContext::default();
        ctx.session.set_otp("123456");

        let mut first = exchange();
        OtpAssertion.process_request(&ctx, &mut first).await.unwrap();
        assert_eq!(first.request().header_str("x-otp"), Some("123456"));

        let mut second = exchange();
        OtpAssertion.process_request(&ctx, &mut second).await.unwrap();
        assert!(second.request().headers.get(X_OTP).is_none());
    }

    #[tokio::test]
    async fn test_empty_otp_not_sent() {
        let ctx = AssertionContext::default();
        ctx.session.set_otp("");
        let mut ex = exchange();
        OtpAssertion.process_request(&ctx, &mut ex).await.unwrap();
        assert!(ex.request().headers.get(X_OTP).is_none());
    }

    #[tokio::test]
    async fn test_challenge_on_required() {
        let ctx = AssertionContext::default();
        let ex = exchange();
        let response = GatewayResponse::new(StatusCode::UNAUTHORIZED)
            .with_header(X_OTP, HeaderValue::from_static("required"))
            .with_header(X_CA_ERROR, HeaderValue::from_static("8000142"))
            .with_json(&json!({"error": "otp_required", "error_description": "OTP required"}));

        let err = OtpAssertion
            .process_response(&ctx, ex.request(), &response)
            .await
            .unwrap_err();
        let challenge = err.otp_challenge().unwrap();
        assert_eq!(challenge.status, 401);
        assert_eq!(challenge.error_code, Some(8000142));
        assert_eq!(challenge.description.as_deref(), Some("OTP required"));
        assert_eq!(challenge.content_type.as_deref(), Some("application/json"));
        assert_eq!(challenge.headers.error_code, Some(OtpErrorCode::OtpRetryLimitExceeded));
    }

    #[tokio::test]
    async fn test_challenge_on_invalid_otp_without_state() {
        let ctx = AssertionContext::default();
        let ex = exchange();
        let response = GatewayResponse::new(StatusCode::FORBIDDEN)
            .with_header(X_CA_ERROR, HeaderValue::from_static("8000140"))
            .with_body("  invalid otp \n");

        let err = OtpAssertion
            .process_response(&ctx, ex.request(), &response)
            .await
            .unwrap_err();
        let challenge = err.otp_challenge().unwrap();
        assert_eq!(challenge.headers.otp_state, OtpState::NotRequired);
        assert_eq!(challenge.description.as_deref(), Some("invalid otp"));
    }

    #[tokio::test]
    async fn test_no_challenge_on_success_or_other_status() {
        let ctx = AssertionContext::default();
        let ex = exchange();

        for status in [StatusCode::OK, StatusCode::INTERNAL_SERVER_ERROR] {
            let response = GatewayResponse::new(status)
                .with_header(X_OTP, HeaderValue::from_static("required"));
            assert!(OtpAssertion
                .process_response(&ctx, ex.request(), &response)
                .await
                .is_ok());
        }

        let plain_401 = GatewayResponse::new(StatusCode::UNAUTHORIZED);
        assert!(OtpAssertion
            .process_response(&ctx, ex.request(), &plain_401)
            .await
            .is_ok());
    }
}
