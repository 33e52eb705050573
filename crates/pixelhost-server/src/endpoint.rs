//! Endpoint kinds and their routers.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use pixelhost_core::Settings;
use serde::Serialize;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};

use crate::connections::ConnectionRegistry;
use crate::relay::RelayHandler;

/// The closed set of endpoints this host can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    /// Primary signaling relay.
    Relay,
    /// Engine worker control channel.
    WorkerControl,
    /// Management/status API.
    ManagementApi,
}

impl EndpointKind {
    /// All kinds, in start order.
    pub const ALL: [EndpointKind; 3] = [
        EndpointKind::Relay,
        EndpointKind::WorkerControl,
        EndpointKind::ManagementApi,
    ];

    /// Stable label used in events and status payloads.
    pub fn label(self) -> &'static str {
        match self {
            EndpointKind::Relay => "relay",
            EndpointKind::WorkerControl => "worker_control",
            EndpointKind::ManagementApi => "management_api",
        }
    }

    /// Configured port for this kind.
    pub fn port(self, settings: &Settings) -> u16 {
        match self {
            EndpointKind::Relay => settings.relay_port,
            EndpointKind::WorkerControl => settings.worker_control_port,
            EndpointKind::ManagementApi => settings.management_port,
        }
    }
}

impl std::fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-endpoint state shared with its handlers.
#[derive(Clone)]
pub(crate) struct EndpointState {
    pub kind: EndpointKind,
    pub connections: Arc<ConnectionRegistry>,
    pub handler: Arc<dyn RelayHandler>,
    pub settings: Settings,
    /// Status provider; filled in by the host so the management endpoint
    /// can report every endpoint, itself included.
    pub status: Arc<dyn crate::host::StatusSource>,
}

/// Build the router for an endpoint kind.
pub(crate) fn build_router(state: EndpointState) -> Router {
    let router = match state.kind {
        EndpointKind::Relay => Router::new()
            .route("/", get(landing_page))
            .route("/status", get(relay_status))
            .route("/ws", get(ws_upgrade)),
        EndpointKind::WorkerControl => Router::new().route("/ws", get(ws_upgrade)),
        EndpointKind::ManagementApi => Router::new()
            .route("/health", get(health))
            .route("/api/status", get(api_status)),
    };
    router.layer(CorsLayer::permissive()).with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Relay summary page pointing at the signaling listener.
async fn landing_page(State(state): State<EndpointState>) -> impl IntoResponse {
    let url = format!("http://127.0.0.1:{}", state.settings.relay_port);
    Html(format!(
        "<!DOCTYPE html><html><head><title>pixelhost</title></head>\
         <body><h1>pixelhost</h1>\
         <p>Signaling is handled by the listener at <a href=\"{url}\">{url}</a>.</p>\
         </body></html>"
    ))
}

async fn relay_status(State(state): State<EndpointState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "running",
        "message": "relay management interface; signaling handled by the listener",
        "signaling_port": state.settings.relay_port,
        "timestamp": unix_now(),
    }))
}

/// Full status for the management API.
async fn api_status(State(state): State<EndpointState>) -> impl IntoResponse {
    let services = state.status.service_status().await;
    let active = state.connections.active_count().await;
    Json(serde_json::json!({
        "status": "ok",
        "services": services,
        "active_connections": active,
        "timestamp": unix_now(),
    }))
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Only text frames carry relay payloads; binary and control frames are
/// ignored rather than forwarded, so non-UTF-8 data is never mangled into
/// a text message.
fn relay_payload(message: Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text),
        _ => None,
    }
}

async fn ws_upgrade(
    State(state): State<EndpointState>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| handle_socket(state, socket))
}

/// Drive one WebSocket connection: register, relay inbound frames through
/// the handler, forward outbound frames from the registry sender, and
/// deregister on any exit path.
async fn handle_socket(state: EndpointState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let id = state.connections.accept(state.kind, tx).await;
    debug!(id = %id, kind = %state.kind, "Connection accepted");

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let payload = match frame {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(message) => match relay_payload(message) {
                Some(payload) => payload,
                None => continue,
            },
        };

        if let Some(reply) = state.handler.on_message(id, &payload).await {
            if !state.connections.send(id, reply).await {
                warn!(id = %id, "Reply to closed connection dropped");
                break;
            }
        }
    }

    state.connections.close(id).await;
    writer.abort();
    debug!(id = %id, kind = %state.kind, "Connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ServiceStatus, StatusSource};
    use crate::relay::ResponseHandler;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct NoServices;

    #[async_trait]
    impl StatusSource for NoServices {
        async fn service_status(&self) -> Vec<ServiceStatus> {
            Vec::new()
        }
    }

    fn state(kind: EndpointKind) -> EndpointState {
        EndpointState {
            kind,
            connections: ConnectionRegistry::new(),
            handler: Arc::new(ResponseHandler),
            settings: Settings::default(),
            status: Arc::new(NoServices),
        }
    }

    #[tokio::test]
    async fn management_health_responds_ok() {
        let app = build_router(state(EndpointKind::ManagementApi));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn management_status_reports_connections() {
        let app = build_router(state(EndpointKind::ManagementApi));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["active_connections"], 0);
    }

    #[tokio::test]
    async fn relay_status_names_signaling_port() {
        let app = build_router(state(EndpointKind::Relay));
        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value["signaling_port"],
            u64::from(Settings::default().relay_port)
        );
    }

    #[test]
    fn only_text_frames_reach_the_relay_handler() {
        assert_eq!(
            relay_payload(Message::Text("hello".to_string())),
            Some("hello".to_string())
        );
        // Arbitrary bytes must not be lossily re-encoded as text.
        assert_eq!(relay_payload(Message::Binary(vec![0x80, 0xff, 0x00])), None);
        assert_eq!(relay_payload(Message::Ping(Vec::new())), None);
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(EndpointKind::Relay.label(), "relay");
        assert_eq!(EndpointKind::WorkerControl.label(), "worker_control");
        assert_eq!(EndpointKind::ManagementApi.label(), "management_api");
    }

    #[test]
    fn ports_follow_settings() {
        let settings = Settings::default();
        assert_eq!(EndpointKind::Relay.port(&settings), settings.relay_port);
        assert_eq!(
            EndpointKind::ManagementApi.port(&settings),
            settings.management_port
        );
    }
}
