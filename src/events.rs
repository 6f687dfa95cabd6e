//! Lifecycle events
//!
//! Higher-level flows announce session and gateway lifecycle changes. The
//! core only needs the narrow [`EventPublisher`] capability; [`EventBus`] is
//! the process-scoped registry that fans events out to listeners.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Lifecycle event tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleEvent {
    Logout,
    DeRegister,
    ResetLocally,
    BeforeGatewaySwitch,
    AfterGatewaySwitch,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::Logout => write!(f, "LOGOUT"),
            LifecycleEvent::DeRegister => write!(f, "DE_REGISTER"),
            LifecycleEvent::ResetLocally => write!(f, "RESET_LOCALLY"),
            LifecycleEvent::BeforeGatewaySwitch => write!(f, "BEFORE_GATEWAY_SWITCH"),
            LifecycleEvent::AfterGatewaySwitch => write!(f, "AFTER_GATEWAY_SWITCH"),
        }
    }
}

/// Capability to announce a lifecycle event
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: LifecycleEvent);
}

/// Publisher that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: LifecycleEvent) {}
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(LifecycleEvent) + Send + Sync>;

/// Synchronous fan-out to registered listeners, in subscription order
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(LifecycleEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|p| p.into_inner());
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(|p| p.into_inner()).len()
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: LifecycleEvent) {
        // Snapshot so listeners may subscribe/unsubscribe while being notified
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        debug!(event = %event, listeners = listeners.len(), "Publishing lifecycle event");
        for listener in listeners {
            listener(event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
