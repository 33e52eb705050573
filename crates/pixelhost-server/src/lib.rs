//! Multi-endpoint service host.
//!
//! Hosts the signaling relay, worker-control, and management API
//! endpoints on independent ports. Endpoints share one connection
//! registry and one event channel but start and stop independently, so a
//! bind failure on one port never takes down the others.

#![deny(unsafe_code)]

// Silence unused dev-dependency warnings until tests need its helpers
#[cfg(test)]
use tokio_test as _;

pub mod connections;
pub mod endpoint;
pub mod host;
pub mod relay;

pub use connections::{ConnectionId, ConnectionRegistry};
pub use endpoint::EndpointKind;
pub use host::ServiceHost;
pub use relay::{AckHandler, RelayHandler, ResponseHandler};
