//! Shared connection registry.
//!
//! Every endpoint registers its live WebSocket connections here, so the
//! management API can report one consistent count. All access goes
//! through a single async mutex; no I/O happens while it is held, and
//! sends go through the connection's channel sender rather than the
//! socket itself.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::endpoint::EndpointKind;

/// Opaque connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

struct Connection {
    kind: EndpointKind,
    sender: mpsc::UnboundedSender<String>,
}

/// Registry of live connections across all endpoints.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<HashMap<ConnectionId, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a connection, returning its generated id.
    pub async fn accept(
        &self,
        kind: EndpointKind,
        sender: mpsc::UnboundedSender<String>,
    ) -> ConnectionId {
        let id = ConnectionId(Uuid::new_v4());
        let mut inner = self.inner.lock().await;
        inner.insert(id, Connection { kind, sender });
        id
    }

    /// Remove a connection. Closing an unknown or already-closed id is a
    /// no-op; returns whether an entry was removed.
    pub async fn close(&self, id: ConnectionId) -> bool {
        let mut inner = self.inner.lock().await;
        inner.remove(&id).is_some()
    }

    /// Queue an outbound message. Returns false when the connection is
    /// gone or its writer has hung up.
    pub async fn send(&self, id: ConnectionId, message: String) -> bool {
        let inner = self.inner.lock().await;
        match inner.get(&id) {
            Some(conn) => conn.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Total live connections across all endpoints.
    pub async fn active_count(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Live connections for one endpoint kind.
    pub async fn count_for(&self, kind: EndpointKind) -> usize {
        let inner = self.inner.lock().await;
        inner.values().filter(|c| c.kind == kind).count()
    }

    /// Drop every connection belonging to an endpoint that is going down.
    pub async fn close_all_for(&self, kind: EndpointKind) -> usize {
        let mut inner = self.inner.lock().await;
        let before = inner.len();
        inner.retain(|_, c| c.kind != kind);
        let closed = before - inner.len();
        if closed > 0 {
            debug!(kind = %kind, closed = closed, "Dropped connections for endpoint");
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> mpsc::UnboundedSender<String> {
        let (tx, _rx) = mpsc::unbounded_channel();
        tx
    }

    #[tokio::test]
    async fn accept_and_close_track_count() {
        let registry = ConnectionRegistry::new();
        let a = registry.accept(EndpointKind::Relay, sender()).await;
        let b = registry.accept(EndpointKind::WorkerControl, sender()).await;
        assert_eq!(registry.active_count().await, 2);
        assert_eq!(registry.count_for(EndpointKind::Relay).await, 1);

        assert!(registry.close(a).await);
        assert!(registry.close(b).await);
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn double_close_is_noop() {
        let registry = ConnectionRegistry::new();
        let id = registry.accept(EndpointKind::Relay, sender()).await;
        assert!(registry.close(id).await);
        assert!(!registry.close(id).await);
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn send_to_closed_connection_fails() {
        let registry = ConnectionRegistry::new();
        let id = registry.accept(EndpointKind::Relay, sender()).await;
        registry.close(id).await;
        assert!(!registry.send(id, "hello".to_string()).await);
    }

    #[tokio::test]
    async fn send_reaches_live_channel() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = registry.accept(EndpointKind::WorkerControl, tx).await;

        assert!(registry.send(id, "ping".to_string()).await);
        assert_eq!(rx.recv().await.as_deref(), Some("ping"));
    }

    #[tokio::test]
    async fn close_all_for_kind_leaves_others() {
        let registry = ConnectionRegistry::new();
        for _ in 0..3 {
            registry.accept(EndpointKind::Relay, sender()).await;
        }
        for _ in 0..2 {
            registry.accept(EndpointKind::WorkerControl, sender()).await;
        }
        assert_eq!(registry.active_count().await, 5);

        assert_eq!(registry.close_all_for(EndpointKind::Relay).await, 3);
        assert_eq!(registry.active_count().await, 2);
        assert_eq!(registry.count_for(EndpointKind::WorkerControl).await, 2);
    }

    #[tokio::test]
    async fn concurrent_accepts_and_closes_stay_consistent() {
        let registry = ConnectionRegistry::new();

        let mut accept_tasks = Vec::new();
        for _ in 0..16 {
            let reg = registry.clone();
            accept_tasks.push(tokio::spawn(async move {
                reg.accept(EndpointKind::Relay, sender()).await
            }));
        }
        let mut ids = Vec::new();
        for task in accept_tasks {
            ids.push(task.await.unwrap());
        }

        let mut close_tasks = Vec::new();
        for id in ids.into_iter().take(9) {
            let reg = registry.clone();
            close_tasks.push(tokio::spawn(async move { reg.close(id).await }));
        }
        for task in close_tasks {
            assert!(task.await.unwrap());
        }

        assert_eq!(registry.active_count().await, 16 - 9);
    }
}
