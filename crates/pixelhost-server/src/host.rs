//! Service host: lifecycle for the three endpoints.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use pixelhost_core::{EndpointControl, EventBroadcaster, HostError, HostEvent, SettingsHandle};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::connections::ConnectionRegistry;
use crate::endpoint::{build_router, EndpointKind, EndpointState};
use crate::relay::{AckHandler, RelayHandler, ResponseHandler};

/// One reportable service row for the management API.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub kind: EndpointKind,
    pub port: u16,
    pub running: bool,
}

/// Source of service status rows; the management endpoint queries this so
/// it can report every endpoint, itself included.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn service_status(&self) -> Vec<ServiceStatus>;
}

struct RunningEndpoint {
    port: u16,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

type EndpointMap = Arc<Mutex<HashMap<EndpointKind, RunningEndpoint>>>;

/// Status view over the endpoint table.
struct EndpointTable(EndpointMap);

#[async_trait]
impl StatusSource for EndpointTable {
    async fn service_status(&self) -> Vec<ServiceStatus> {
        let endpoints = self.0.lock().await;
        EndpointKind::ALL
            .iter()
            .map(|&kind| {
                let running = endpoints.get(&kind);
                ServiceStatus {
                    kind,
                    port: running.map_or(0, |e| e.port),
                    running: running.is_some(),
                }
            })
            .collect()
    }
}

/// Hosts the relay, worker-control, and management endpoints.
pub struct ServiceHost {
    connections: Arc<ConnectionRegistry>,
    events: Arc<EventBroadcaster>,
    settings: Arc<SettingsHandle>,
    handlers: HashMap<EndpointKind, Arc<dyn RelayHandler>>,
    endpoints: EndpointMap,
}

impl ServiceHost {
    pub fn new(events: Arc<EventBroadcaster>, settings: Arc<SettingsHandle>) -> Self {
        let mut handlers: HashMap<EndpointKind, Arc<dyn RelayHandler>> = HashMap::new();
        handlers.insert(EndpointKind::Relay, Arc::new(ResponseHandler));
        handlers.insert(EndpointKind::WorkerControl, Arc::new(AckHandler));

        Self {
            connections: ConnectionRegistry::new(),
            events,
            settings,
            handlers,
            endpoints: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Replace the handler for an endpoint kind. Takes effect on the next
    /// start of that endpoint.
    #[must_use]
    pub fn with_handler(mut self, kind: EndpointKind, handler: Arc<dyn RelayHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// Start an endpoint on the given port.
    ///
    /// If the same kind is already running it is stopped first and
    /// replaced; other kinds are never touched. A bind failure leaves the
    /// kind stopped.
    pub async fn start_endpoint(&self, kind: EndpointKind, port: u16) -> Result<u16, HostError> {
        self.stop_endpoint(kind).await;

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = match TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                warn!(kind = %kind, port = port, error = %e, "Endpoint bind failed");
                self.events
                    .broadcast(HostEvent::service_error(kind.label(), e.to_string()));
                return Err(HostError::StartFailure {
                    kind: kind.label().to_string(),
                    port,
                    detail: e.to_string(),
                });
            }
        };
        let bound_port = listener
            .local_addr()
            .map(|a| a.port())
            .unwrap_or(port);

        let handler = self
            .handlers
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Arc::new(ResponseHandler));
        let state = EndpointState {
            kind,
            connections: self.connections.clone(),
            handler,
            settings: self.settings.snapshot(),
            status: Arc::new(EndpointTable(self.endpoints.clone())),
        };
        let app = build_router(state);

        let cancel = CancellationToken::new();
        let serve_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(serve_cancel.cancelled_owned())
                .await
            {
                warn!(kind = %kind, error = %e, "Endpoint server error");
            }
        });

        let mut endpoints = self.endpoints.lock().await;
        endpoints.insert(
            kind,
            RunningEndpoint {
                port: bound_port,
                cancel,
                task,
            },
        );
        drop(endpoints);

        info!(kind = %kind, port = bound_port, "Endpoint started");
        self.events
            .broadcast(HostEvent::service_started(kind.label(), bound_port));
        Ok(bound_port)
    }

    /// Stop an endpoint. Stopping a kind that is not running is a no-op;
    /// returns whether anything was stopped.
    pub async fn stop_endpoint(&self, kind: EndpointKind) -> bool {
        let entry = {
            let mut endpoints = self.endpoints.lock().await;
            endpoints.remove(&kind)
        };
        let Some(endpoint) = entry else {
            return false;
        };

        endpoint.cancel.cancel();
        if let Err(e) = endpoint.task.await {
            warn!(kind = %kind, error = %e, "Endpoint task join failed");
        }
        self.connections.close_all_for(kind).await;

        info!(kind = %kind, port = endpoint.port, "Endpoint stopped");
        self.events
            .broadcast(HostEvent::service_stopped(kind.label(), endpoint.port));
        true
    }

    /// Start every endpoint on its configured port, best-effort.
    ///
    /// All kinds are attempted; endpoints that came up stay up even when a
    /// later one fails. The first failure is returned.
    pub async fn start_all(&self) -> Result<(), HostError> {
        let settings = self.settings.snapshot();
        let mut first_error = None;

        for kind in EndpointKind::ALL {
            let port = kind.port(&settings);
            if let Err(e) = self.start_endpoint(kind, port).await {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stop every running endpoint; returns how many were stopped.
    pub async fn stop_all(&self) -> usize {
        let mut stopped = 0usize;
        for kind in EndpointKind::ALL {
            if self.stop_endpoint(kind).await {
                stopped += 1;
            }
        }
        stopped
    }

    /// Whether an endpoint kind is currently running.
    pub async fn is_running(&self, kind: EndpointKind) -> bool {
        self.endpoints.lock().await.contains_key(&kind)
    }

    /// Actual bound port of a running endpoint.
    pub async fn port_of(&self, kind: EndpointKind) -> Option<u16> {
        self.endpoints.lock().await.get(&kind).map(|e| e.port)
    }

    /// Status rows for all endpoint kinds.
    pub async fn status(&self) -> Vec<ServiceStatus> {
        EndpointTable(self.endpoints.clone()).service_status().await
    }
}

#[async_trait]
impl EndpointControl for ServiceHost {
    async fn start_all_endpoints(&self) -> bool {
        self.start_all().await.is_ok()
    }

    async fn stop_all_endpoints(&self) -> usize {
        self.stop_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixelhost_core::Settings;

    fn host() -> ServiceHost {
        ServiceHost::new(
            EventBroadcaster::new(),
            Arc::new(SettingsHandle::new(Settings::default())),
        )
    }

    #[tokio::test]
    async fn start_and_stop_one_endpoint() {
        let host = host();
        let port = host
            .start_endpoint(EndpointKind::ManagementApi, 0)
            .await
            .expect("bind failed");
        assert!(port > 0);
        assert!(host.is_running(EndpointKind::ManagementApi).await);

        assert!(host.stop_endpoint(EndpointKind::ManagementApi).await);
        assert!(!host.is_running(EndpointKind::ManagementApi).await);
    }

    #[tokio::test]
    async fn stop_when_not_running_is_noop() {
        let host = host();
        assert!(!host.stop_endpoint(EndpointKind::Relay).await);
    }

    #[tokio::test]
    async fn starting_same_kind_twice_replaces() {
        let host = host();
        let first = host
            .start_endpoint(EndpointKind::Relay, 0)
            .await
            .expect("bind failed");
        let second = host
            .start_endpoint(EndpointKind::Relay, 0)
            .await
            .expect("bind failed");
        assert_ne!(first, second);

        // Exactly one live endpoint of that kind.
        assert_eq!(host.port_of(EndpointKind::Relay).await, Some(second));
        assert_eq!(host.stop_all().await, 1);
    }

    #[tokio::test]
    async fn bind_conflict_is_start_failure() {
        let host = host();
        let occupied = TcpListener::bind("0.0.0.0:0").await.unwrap();
        let port = occupied.local_addr().unwrap().port();

        let err = host
            .start_endpoint(EndpointKind::WorkerControl, port)
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::StartFailure { .. }));
        assert!(!host.is_running(EndpointKind::WorkerControl).await);
    }

    #[tokio::test]
    async fn stop_all_drops_connections_from_both_endpoints() {
        let host = host();
        host.start_endpoint(EndpointKind::Relay, 0)
            .await
            .expect("bind failed");
        host.start_endpoint(EndpointKind::WorkerControl, 0)
            .await
            .expect("bind failed");

        let connections = host.connections();
        for _ in 0..3 {
            let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
            connections.accept(EndpointKind::Relay, tx).await;
        }
        for _ in 0..2 {
            let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
            connections.accept(EndpointKind::WorkerControl, tx).await;
        }
        assert_eq!(connections.active_count().await, 5);

        assert_eq!(host.stop_all().await, 2);
        assert_eq!(connections.active_count().await, 0);
    }

    #[tokio::test]
    async fn status_lists_all_kinds() {
        let host = host();
        host.start_endpoint(EndpointKind::ManagementApi, 0)
            .await
            .expect("bind failed");

        let status = host.status().await;
        assert_eq!(status.len(), EndpointKind::ALL.len());
        let mgmt = status
            .iter()
            .find(|s| s.kind == EndpointKind::ManagementApi)
            .unwrap();
        assert!(mgmt.running);
        let relay = status.iter().find(|s| s.kind == EndpointKind::Relay).unwrap();
        assert!(!relay.running);

        host.stop_all().await;
    }
}
