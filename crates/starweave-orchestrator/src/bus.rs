//! In-process publish/subscribe hub for task- and graph-level events.
//!
//! One bus instance is created per session and passed explicitly to every
//! component that needs it. Observers are an integration surface only: a
//! missing or crashing observer must never affect scheduling.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

use starweave_core::BusEvent;

/// Error an observer may return from delivery. It is logged and swallowed.
#[derive(Debug, Error)]
#[error("Observer error: {0}")]
pub struct ObserverError(pub String);

impl ObserverError {
    /// Create an observer error from any displayable cause.
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// A subscriber to session events.
#[async_trait]
pub trait EventObserver: Send + Sync {
    /// Handle one event. Failures are isolated to this observer.
    async fn on_event(&self, event: &BusEvent) -> Result<(), ObserverError>;

    /// Name used when logging delivery failures.
    fn name(&self) -> &str {
        "observer"
    }
}

/// In-process event bus.
pub struct EventBus {
    subscribers: RwLock<Vec<Arc<dyn EventObserver>>>,
}

impl EventBus {
    /// Create a new, empty bus.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Register an observer for all subsequent events.
    pub async fn subscribe(&self, observer: Arc<dyn EventObserver>) {
        self.subscribers.write().await.push(observer);
    }

    /// Number of current subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Deliver an event to every current subscriber.
    ///
    /// Awaits each delivery attempt; one subscriber's failure is logged and
    /// does not prevent delivery to the rest.
    pub async fn publish(&self, event: BusEvent) {
        let subscribers = self.subscribers.read().await.clone();
        for observer in subscribers {
            if let Err(e) = observer.on_event(&event).await {
                warn!(observer = observer.name(), error = %e, "Event delivery failed");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
