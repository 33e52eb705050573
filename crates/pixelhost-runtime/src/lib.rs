//! Process supervision runtime for pixelhost.
//!
//! This crate owns every OS-level concern: spawning and tracking external
//! processes, the bounded termination escalator, system-wide scans for
//! stray engine processes, the listener/worker pair supervisor, and the
//! engine control facade that composes them.

#![deny(unsafe_code)]

// Silence unused dev-dependency warnings until tests need its helpers
#[cfg(test)]
use tokio_test as _;

pub mod facade;
pub mod pair;
pub mod process;

pub use facade::EngineController;
pub use pair::{PairState, PairSupervisor};
pub use process::{
    ExternalProcess, ProcessInfo, ProcessRegistry, ProcessTreeKiller, SpawnSpec,
    SysinfoTreeKiller,
};
