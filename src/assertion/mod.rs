//! Assertion chain
//!
//! An assertion is a pluggable policy that observes one gateway exchange:
//! it may add headers to the outgoing request and inspect the response,
//! failing the exchange with a typed error.
//!
//! ## Ordering
//!
//! The chain is fixed at construction. Request hooks and response hooks both
//! run in that order (response hooks are NOT reversed), and each phase stops
//! at the first hook that fails.
//!
//! ## Lifecycle
//!
//! ```text
//! new() ── init each ──▶ [request phase ─▶ HTTP ─▶ response phase]* ── drop ──▶ close each
//! ```

pub mod otp;

pub use otp::{OtpAssertion, OtpChallenge, OtpErrorCode, OtpResponseHeaders, OtpState};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::http::{GatewayRequest, GatewayResponse, HttpExecutor, RequestContext};
use crate::platform::PlatformContext;
use crate::session::SessionState;
use crate::types::{GatekeeperError, Result};

/// Shared context handed to every assertion hook
#[derive(Debug, Clone)]
pub struct AssertionContext {
    pub session: Arc<SessionState>,
    pub platform: Arc<PlatformContext>,
}

impl AssertionContext {
    pub fn new(session: Arc<SessionState>, platform: Arc<PlatformContext>) -> Self {
        Self { session, platform }
    }
}

impl Default for AssertionContext {
    fn default() -> Self {
        Self::new(Arc::new(SessionState::new()), Arc::new(PlatformContext::default()))
    }
}

/// A policy over gateway exchanges
#[async_trait]
pub trait Assertion: Send + Sync {
    /// Name used in logs and in [`GatekeeperError::ChainAborted`]
    fn name(&self) -> &str;

    /// Called once before the first exchange
    fn init(&mut self, _ctx: &AssertionContext) -> Result<()> {
        Ok(())
    }

    /// Observe or modify the outgoing request
    async fn process_request(&self, ctx: &AssertionContext, exchange: &mut RequestContext) -> Result<()>;

    /// Inspect the response. Must not modify it.
    async fn process_response(
        &self,
        ctx: &AssertionContext,
        request: &GatewayRequest,
        response: &GatewayResponse,
    ) -> Result<()>;

    /// Called once when the chain is torn down
    fn close(&mut self) {}
}

/// Ordered, fixed list of assertions
pub struct AssertionChain {
    assertions: Vec<Box<dyn Assertion>>,
    context: AssertionContext,
}

impl AssertionChain {
    /// Initialize every assertion in order.
    ///
    /// If one fails to initialize, those already initialized are closed and
    /// the error is returned.
    pub fn new(mut assertions: Vec<Box<dyn Assertion>>, context: AssertionContext) -> Result<Self> {
        for i in 0..assertions.len() {
            if let Err(e) = assertions[i].init(&context) {
                warn!(assertion = assertions[i].name(), error = %e, "Assertion failed to initialize");
                for initialized in assertions[..i].iter_mut() {
                    initialized.close();
                }
                return Err(e);
            }
        }

        debug!(
            assertions = ?assertions.iter().map(|a| a.name()).collect::<Vec<_>>(),
            "Assertion chain initialized"
        );
        Ok(Self { assertions, context })
    }

    pub fn context(&self) -> &AssertionContext {
        &self.context
    }

    pub fn len(&self) -> usize {
        self.assertions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assertions.is_empty()
    }

    /// Run every request hook in order.
    ///
    /// The first failure stops the phase and is returned as
    /// [`GatekeeperError::ChainAborted`]; the caller must not execute the
    /// HTTP call.
    pub async fn run_request_phase(&self, exchange: &mut RequestContext) -> Result<()> {
        for assertion in &self.assertions {
            if let Err(e) = assertion.process_request(&self.context, exchange).await {
                warn!(assertion = assertion.name(), error = %e, "Request phase aborted");
                return Err(GatekeeperError::ChainAborted {
                    assertion: assertion.name().to_string(),
                    source: Box::new(e),
                });
            }
        }
        Ok(())
    }

    /// Run every response hook in the same order as the request hooks.
    ///
    /// The first failure stops the phase and is returned as is.
    pub async fn run_response_phase(&self, exchange: &RequestContext) -> Result<()> {
        let response = exchange
            .response()
            .ok_or_else(|| GatekeeperError::protocol("Response phase run before the request executed"))?;

        for assertion in &self.assertions {
            if let Err(e) = assertion
                .process_response(&self.context, exchange.request(), response)
                .await
            {
                debug!(
                    assertion = assertion.name(),
                    status = response.status.as_u16(),
                    error = %e,
                    "Response phase raised"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Request phase, HTTP call, response phase
    pub async fn execute(
        &self,
        executor: &dyn HttpExecutor,
        request: GatewayRequest,
    ) -> Result<GatewayResponse> {
        let mut exchange = RequestContext::new(request);
        self.run_request_phase(&mut exchange).await?;

        let response = executor.execute(exchange.request().clone()).await?;
        exchange.set_response(response);

        self.run_response_phase(&exchange).await?;
        exchange
            .into_response()
            .ok_or_else(|| GatekeeperError::protocol("Exchange lost its response"))
    }
}

impl Drop for AssertionChain {
    fn drop(&mut self) {
        for assertion in self.assertions.iter_mut() {
            assertion.close();
        }
    }
}

impl std::fmt::Debug for AssertionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssertionChain")
            .field(
                "assertions",
                &self.assertions.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::{StatusCode, Url};
    use std::sync::Mutex;

    /// Records every hook call into a shared log
    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_init: bool,
    }

    impl Recording {
        fn boxed(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Box<dyn Assertion> {
            Box::new(Self {
                name,
                log: Arc::clone(log),
                fail_init: false,
            })
        }

        fn push(&self, event: &str) {
            self.log.lock().unwrap().push(format!("{}:{}", self.name, event));
        }
    }

    #[async_trait]
    impl Assertion for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn init(&mut self, _ctx: &AssertionContext) -> Result<()> {
            self.push("init");
            if self.fail_init {
                return Err(GatekeeperError::Config("init failed".into()));
            }
            Ok(())
        }

        async fn process_request(&self, _ctx: &AssertionContext, _exchange: &mut RequestContext) -> Result<()> {
            self.push("request");
            Ok(())
        }

        async fn process_response(
            &self,
            _ctx: &AssertionContext,
            _request: &GatewayRequest,
            _response: &GatewayResponse,
        ) -> Result<()> {
            self.push("response");
            Ok(())
        }

        fn close(&mut self) {
            self.push("close");
        }
    }

    fn exchange() -> RequestContext {
        RequestContext::new(GatewayRequest::get(
            Url::parse("https://gateway.example.com/api").unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_phases_run_in_same_order_and_close_on_drop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = AssertionChain::new(
            vec![Recording::boxed("a", &log), Recording::boxed("b", &log)],
            AssertionContext::default(),
        )
        .unwrap();

        let mut ctx = exchange();
        chain.run_request_phase(&mut ctx).await.unwrap();
        ctx.set_response(GatewayResponse::new(StatusCode::OK));
        chain.run_response_phase(&ctx).await.unwrap();
        drop(chain);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "a:init", "b:init", "a:request", "b:request", "a:response", "b:response", "a:close",
                "b:close"
            ]
        );
    }

    #[tokio::test]
    async fn test_response_phase_requires_response() {
        let chain = AssertionChain::new(vec![], AssertionContext::default()).unwrap();
        let err = chain.run_response_phase(&exchange()).await.unwrap_err();
        assert!(err.is_client_side());
    }

    #[test]
    fn test_failed_init_closes_initialized_assertions() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let failing = Box::new(Recording {
            name: "b",
            log: Arc::clone(&log),
            fail_init: true,
        });
        let result = AssertionChain::new(
            vec![Recording::boxed("a", &log), failing, Recording::boxed("c", &log)],
            AssertionContext::default(),
        );

        assert!(matches!(result, Err(GatekeeperError::Config(_))));
        assert_eq!(*log.lock().unwrap(), vec!["a:init", "b:init", "a:close"]);
    }
}
