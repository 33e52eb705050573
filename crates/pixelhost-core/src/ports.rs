//! Ports implemented by adapter crates and consumed by the controller.

use async_trait::async_trait;

/// Control surface for the network endpoint host.
///
/// The controller composes this into whole-system start/stop without
/// depending on the hosting adapter.
#[async_trait]
pub trait EndpointControl: Send + Sync {
    /// Start every configured endpoint. Best-effort: endpoints that came
    /// up stay up; returns true only when all of them did.
    async fn start_all_endpoints(&self) -> bool;

    /// Stop every running endpoint; returns how many were stopped.
    async fn stop_all_endpoints(&self) -> usize;
}
