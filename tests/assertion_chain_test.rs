//! Assertion chain integration tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use gatekeeper::assertion::otp::X_OTP;
use gatekeeper::assertion::{Assertion, AssertionChain, AssertionContext, OtpAssertion, OtpState};
use gatekeeper::http::{GatewayRequest, GatewayResponse, HttpExecutor, RequestContext};
use gatekeeper::{GatekeeperError, Result};
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{StatusCode, Url};

const TRACE: HeaderName = HeaderName::from_static("x-trace");
const SEEN: HeaderName = HeaderName::from_static("x-seen");

/// Records requests and answers with a fixed response
struct FakeGateway {
    response: GatewayResponse,
    requests: Mutex<Vec<GatewayRequest>>,
}

impl FakeGateway {
    fn new(response: GatewayResponse) -> Self {
        Self {
            response,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> GatewayRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl HttpExecutor for FakeGateway {
    async fn execute(&self, request: GatewayRequest) -> Result<GatewayResponse> {
        self.requests.lock().unwrap().push(request);
        Ok(self.response.clone())
    }
}

/// Sets the trace header
struct Stamp;

#[async_trait]
impl Assertion for Stamp {
    fn name(&self) -> &str {
        "stamp"
    }

    async fn process_request(&self, _ctx: &AssertionContext, exchange: &mut RequestContext) -> Result<()> {
        exchange
            .request_mut()
            .headers
            .insert(TRACE, HeaderValue::from_static("stamped"));
        Ok(())
    }

    async fn process_response(
        &self,
        _ctx: &AssertionContext,
        _request: &GatewayRequest,
        _response: &GatewayResponse,
    ) -> Result<()> {
        Ok(())
    }
}

/// Copies whatever trace header it sees into another header
struct Observe;

#[async_trait]
impl Assertion for Observe {
    fn name(&self) -> &str {
        "observe"
    }

    async fn process_request(&self, _ctx: &AssertionContext, exchange: &mut RequestContext) -> Result<()> {
        let seen = exchange
            .request()
            .headers
            .get(&TRACE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("nothing"));
        exchange.request_mut().headers.insert(SEEN, seen);
        Ok(())
    }

    async fn process_response(
        &self,
        _ctx: &AssertionContext,
        _request: &GatewayRequest,
        _response: &GatewayResponse,
    ) -> Result<()> {
        Ok(())
    }
}

/// Rejects every request
struct Deny;

#[async_trait]
impl Assertion for Deny {
    fn name(&self) -> &str {
        "deny"
    }

    async fn process_request(&self, _ctx: &AssertionContext, _exchange: &mut RequestContext) -> Result<()> {
        Err(GatekeeperError::InvalidArgument("no credentials".into()))
    }

    async fn process_response(
        &self,
        _ctx: &AssertionContext,
        _request: &GatewayRequest,
        _response: &GatewayResponse,
    ) -> Result<()> {
        Ok(())
    }
}

/// Counts hook invocations
#[derive(Default)]
struct Counter {
    requests: Arc<AtomicUsize>,
    responses: Arc<AtomicUsize>,
}

#[async_trait]
impl Assertion for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    async fn process_request(&self, _ctx: &AssertionContext, _exchange: &mut RequestContext) -> Result<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn process_response(
        &self,
        _ctx: &AssertionContext,
        _request: &GatewayRequest,
        _response: &GatewayResponse,
    ) -> Result<()> {
        self.responses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn request() -> GatewayRequest {
    GatewayRequest::get(Url::parse("https://gateway.example.com/protected/resource").unwrap())
}

fn chain(assertions: Vec<Box<dyn Assertion>>) -> AssertionChain {
    AssertionChain::new(assertions, AssertionContext::default()).unwrap()
}

#[tokio::test]
async fn test_request_hooks_see_earlier_mutations() {
    let gateway = FakeGateway::new(GatewayResponse::new(StatusCode::OK));

    chain(vec![Box::new(Stamp), Box::new(Observe)])
        .execute(&gateway, request())
        .await
        .unwrap();
    assert_eq!(gateway.last_request().header_str("x-seen"), Some("stamped"));

    chain(vec![Box::new(Observe), Box::new(Stamp)])
        .execute(&gateway, request())
        .await
        .unwrap();
    assert_eq!(gateway.last_request().header_str("x-seen"), Some("nothing"));
}

#[tokio::test]
async fn test_failing_request_hook_short_circuits() {
    let gateway = FakeGateway::new(GatewayResponse::new(StatusCode::OK));
    let counter = Counter::default();
    let requests = Arc::clone(&counter.requests);
    let responses = Arc::clone(&counter.responses);

    let err = chain(vec![Box::new(Deny), Box::new(counter)])
        .execute(&gateway, request())
        .await
        .unwrap_err();

    match err {
        GatekeeperError::ChainAborted { assertion, source } => {
            assert_eq!(assertion, "deny");
            assert!(matches!(*source, GatekeeperError::InvalidArgument(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(requests.load(Ordering::SeqCst), 0);
    assert_eq!(responses.load(Ordering::SeqCst), 0);
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn test_otp_is_sent_on_one_exchange_only() {
    let gateway = FakeGateway::new(GatewayResponse::new(StatusCode::OK));
    let chain = chain(vec![Box::new(OtpAssertion::new())]);
    chain.context().session.set_otp("123456");

    chain.execute(&gateway, request()).await.unwrap();
    assert_eq!(gateway.last_request().header_str("x-otp"), Some("123456"));
    assert!(!chain.context().session.has_pending_otp());

    chain.execute(&gateway, request()).await.unwrap();
    assert!(gateway.last_request().headers.get(X_OTP).is_none());
}

#[tokio::test]
async fn test_otp_challenge_stops_response_phase() {
    let gateway = FakeGateway::new(
        GatewayResponse::new(StatusCode::UNAUTHORIZED)
            .with_header(X_OTP, HeaderValue::from_static("REQUIRED"))
            .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .with_body("otp required"),
    );
    let counter = Counter::default();
    let responses = Arc::clone(&counter.responses);

    let err = chain(vec![Box::new(OtpAssertion::new()), Box::new(counter)])
        .execute(&gateway, request())
        .await
        .unwrap_err();

    let challenge = err.otp_challenge().expect("otp challenge");
    assert_eq!(challenge.status, 401);
    assert_eq!(challenge.content_type.as_deref(), Some("text/plain"));
    assert_eq!(challenge.headers.otp_state, OtpState::Required);
    assert_eq!(challenge.error_code, None);
    assert!(matches!(err, GatekeeperError::OtpChallenge(_)));
    assert!(err.is_server_side());
    assert_eq!(responses.load(Ordering::SeqCst), 0);
    assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn test_success_never_raises_otp_challenge() {
    let gateway = FakeGateway::new(
        GatewayResponse::new(StatusCode::OK)
            .with_header(X_OTP, HeaderValue::from_static("required"))
            .with_header(
                HeaderName::from_static("x-ca-err"),
                HeaderValue::from_static("8000140"),
            ),
    );
    let response = chain(vec![Box::new(OtpAssertion::new())])
        .execute(&gateway, request())
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
}
