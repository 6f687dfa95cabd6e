//! User consent for session sharing
//!
//! A consent handler is answered exactly once: both methods consume the
//! handler, so a second answer does not compile.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::debug;

/// Answer to a consent request
pub trait ConsentHandler: Send {
    fn proceed(self: Box<Self>);
    fn cancel(self: Box<Self>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentDecision {
    Proceed,
    Cancel,
}

/// Handler backed by a oneshot channel
#[derive(Debug)]
pub struct OneShotConsent {
    tx: oneshot::Sender<ConsentDecision>,
}

impl OneShotConsent {
    fn answer(self, decision: ConsentDecision) {
        debug!(?decision, "Consent answered");
        // The requester may have given up waiting; nothing to do then
        let _ = self.tx.send(decision);
    }
}

impl ConsentHandler for OneShotConsent {
    fn proceed(self: Box<Self>) {
        (*self).answer(ConsentDecision::Proceed);
    }

    fn cancel(self: Box<Self>) {
        (*self).answer(ConsentDecision::Cancel);
    }
}

/// Waiting side of a consent request
#[derive(Debug)]
pub struct ConsentReceiver {
    rx: oneshot::Receiver<ConsentDecision>,
}

impl ConsentReceiver {
    /// Wait for the answer. A handler dropped without answering counts as
    /// [`ConsentDecision::Cancel`].
    pub async fn decision(self) -> ConsentDecision {
        self.rx.await.unwrap_or(ConsentDecision::Cancel)
    }
}

/// Create a consent request: hand the handler to the UI, await the receiver
pub fn consent_request() -> (OneShotConsent, ConsentReceiver) {
    let (tx, rx) = oneshot::channel();
    (OneShotConsent { tx }, ConsentReceiver { rx })
}
