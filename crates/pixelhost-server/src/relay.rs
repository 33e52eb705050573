//! Pluggable per-endpoint message handling.
//!
//! Payloads are opaque to the host; a handler decides what, if anything,
//! to send back. The built-in handlers reproduce the control-channel
//! envelopes clients expect: worker-control acknowledges every frame,
//! the relay answers with a response stamp.

use async_trait::async_trait;
use tracing::debug;

use crate::connections::ConnectionId;

/// Handles inbound frames for one endpoint kind.
#[async_trait]
pub trait RelayHandler: Send + Sync {
    /// Process one inbound payload; the returned string, if any, is sent
    /// back on the same connection.
    async fn on_message(&self, id: ConnectionId, payload: &str) -> Option<String>;
}

fn timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Worker-control handler: acknowledge every frame.
pub struct AckHandler;

#[async_trait]
impl RelayHandler for AckHandler {
    async fn on_message(&self, id: ConnectionId, payload: &str) -> Option<String> {
        debug!(id = %id, len = payload.len(), "Worker-control frame");
        Some(
            serde_json::json!({
                "type": "ack",
                "connectionId": id.to_string(),
                "timestamp": timestamp(),
            })
            .to_string(),
        )
    }
}

/// Relay handler: stamp every frame with a response envelope.
pub struct ResponseHandler;

#[async_trait]
impl RelayHandler for ResponseHandler {
    async fn on_message(&self, id: ConnectionId, payload: &str) -> Option<String> {
        debug!(id = %id, len = payload.len(), "Relay frame");
        Some(
            serde_json::json!({
                "type": "response",
                "connectionId": id.to_string(),
                "timestamp": timestamp(),
            })
            .to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::ConnectionRegistry;
    use crate::endpoint::EndpointKind;
    use tokio::sync::mpsc;

    async fn some_id() -> ConnectionId {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.accept(EndpointKind::WorkerControl, tx).await
    }

    #[tokio::test]
    async fn ack_handler_echoes_connection_id() {
        let id = some_id().await;
        let reply = AckHandler.on_message(id, "{\"cmd\":\"status\"}").await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["type"], "ack");
        assert_eq!(value["connectionId"], id.to_string());
    }

    #[tokio::test]
    async fn response_handler_stamps_frames() {
        let id = some_id().await;
        let reply = ResponseHandler.on_message(id, "offer").await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["type"], "response");
        assert!(value["timestamp"].as_u64().is_some());
    }
}
