//! Canonical event union for all status notifications.
//!
//! Every component reports lifecycle changes through this single
//! discriminated union, broadcast over one channel. Consumers (CLI status
//! output, the management API) subscribe once at composition time instead
//! of polling shared state.
//!
//! Events are serialized with a `type` tag:
//!
//! ```json
//! { "type": "process_started", "pid": 1234, "name": "engine" }
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Broadcast channel capacity for host events.
const CHANNEL_CAPACITY: usize = 64;

/// Canonical event types for all adapters.
///
/// Each variant carries a human-readable message and, where applicable,
/// the identity of the affected process or endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    // ========== Process Events ==========
    /// A supervised process was spawned and registered.
    ProcessStarted { pid: u32, name: String },

    /// A supervised process exited and was removed from the registry.
    ProcessStopped { pid: u32, name: String },

    /// A supervised process reported an error or failed an operation.
    ProcessError { detail: String },

    // ========== Endpoint Events ==========
    /// A service endpoint started listening.
    ServiceStarted { kind: String, port: u16 },

    /// A service endpoint stopped.
    ServiceStopped { kind: String, port: u16 },

    /// A service endpoint failed to start or faulted.
    ServiceError { kind: String, detail: String },

    // ========== Pair Events ==========
    /// The listener/worker pair is fully running.
    PairStarted { message: String },

    /// The listener/worker pair has stopped.
    PairStopped { message: String },

    /// The pair failed to start, stop, or resync.
    PairError { detail: String },
}

impl HostEvent {
    /// Create a process started event.
    pub fn process_started(pid: u32, name: impl Into<String>) -> Self {
        Self::ProcessStarted {
            pid,
            name: name.into(),
        }
    }

    /// Create a process stopped event.
    pub fn process_stopped(pid: u32, name: impl Into<String>) -> Self {
        Self::ProcessStopped {
            pid,
            name: name.into(),
        }
    }

    /// Create a process error event.
    pub fn process_error(detail: impl Into<String>) -> Self {
        Self::ProcessError {
            detail: detail.into(),
        }
    }

    /// Create a service started event.
    pub fn service_started(kind: impl Into<String>, port: u16) -> Self {
        Self::ServiceStarted {
            kind: kind.into(),
            port,
        }
    }

    /// Create a service stopped event.
    pub fn service_stopped(kind: impl Into<String>, port: u16) -> Self {
        Self::ServiceStopped {
            kind: kind.into(),
            port,
        }
    }

    /// Create a service error event.
    pub fn service_error(kind: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ServiceError {
            kind: kind.into(),
            detail: detail.into(),
        }
    }

    /// Create a pair started event.
    pub fn pair_started(message: impl Into<String>) -> Self {
        Self::PairStarted {
            message: message.into(),
        }
    }

    /// Create a pair stopped event.
    pub fn pair_stopped(message: impl Into<String>) -> Self {
        Self::PairStopped {
            message: message.into(),
        }
    }

    /// Create a pair error event.
    pub fn pair_error(detail: impl Into<String>) -> Self {
        Self::PairError {
            detail: detail.into(),
        }
    }
}

/// Broadcaster for host lifecycle events.
///
/// Cheap to clone via `Arc`; components hold a shared handle and call
/// [`EventBroadcaster::broadcast`] from anywhere, including exit-watcher
/// tasks.
pub struct EventBroadcaster {
    sender: broadcast::Sender<HostEvent>,
}

impl EventBroadcaster {
    /// Create a new broadcaster.
    pub fn new() -> Arc<Self> {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Arc::new(Self { sender })
    }

    /// Broadcast an event to all subscribers.
    pub fn broadcast(&self, event: HostEvent) {
        // Only log if there are receivers (avoid spam when nothing listens)
        if self.sender.receiver_count() > 0 {
            debug!(?event, "Broadcasting host event");
            let _ = self.sender.send(event);
        }
    }

    /// Subscribe to host events.
    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.sender.subscribe()
    }

    /// Get number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_has_type_tag() {
        let event = HostEvent::process_started(1234, "engine");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"process_started\""));
        assert!(json.contains("\"pid\":1234"));
    }

    #[tokio::test]
    async fn broadcast_reaches_subscriber() {
        let broadcaster = EventBroadcaster::new();
        let mut rx = broadcaster.subscribe();
        broadcaster.broadcast(HostEvent::service_started("relay", 9001));
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, HostEvent::ServiceStarted { port: 9001, .. }));
    }

    #[test]
    fn broadcast_without_subscribers_is_silent() {
        let broadcaster = EventBroadcaster::new();
        assert_eq!(broadcaster.subscriber_count(), 0);
        // Must not panic or error
        broadcaster.broadcast(HostEvent::pair_error("nobody listening"));
    }
}
