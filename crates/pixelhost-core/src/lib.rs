//! Core domain types and port definitions for pixelhost.
//!
//! This crate holds the pieces every adapter shares: the immutable
//! [`Settings`] snapshot, the canonical [`HostEvent`] union, and the error
//! taxonomy. It has no process, network, or filesystem dependencies beyond
//! what settings loading needs.

#![deny(unsafe_code)]

// Silence unused dev-dependency warnings until tests need its helpers
#[cfg(test)]
use tokio_test as _;

pub mod error;
pub mod events;
pub mod ports;
pub mod settings;

pub use error::{HostError, PairError, ProcessError, ProcessResult};
pub use events::{EventBroadcaster, HostEvent};
pub use ports::EndpointControl;
pub use settings::{Settings, SettingsHandle};
