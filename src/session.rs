//! Session-scoped state shared by assertions
//!
//! Holds the single pending one-time password. The slot is an
//! exchange-on-read primitive: [`SessionState::take_otp`] returns the value
//! and empties the slot under one lock, so two concurrent exchanges can never
//! both consume the same code.

use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Mutable per-session state
#[derive(Debug, Default)]
pub struct SessionState {
    otp: Mutex<Option<String>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a one-time password for the next gateway exchange.
    ///
    /// Overwrites any code that has not been consumed yet.
    pub fn set_otp(&self, otp: impl Into<String>) {
        let mut slot = self.slot();
        if slot.is_some() {
            debug!("Replacing unconsumed OTP");
        }
        *slot = Some(otp.into());
    }

    /// Take the pending one-time password, leaving the slot empty
    pub fn take_otp(&self) -> Option<String> {
        self.slot().take()
    }

    pub fn has_pending_otp(&self) -> bool {
        self.slot().is_some()
    }

    /// Drop any pending session state
    pub fn clear(&self) {
        self.slot().take();
    }

    fn slot(&self) -> MutexGuard<'_, Option<String>> {
        // The slot holds plain data, a panic elsewhere cannot leave it half-written
        self.otp.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
