//! Process spawning, tracking, and guaranteed termination.
//!
//! The registry tracks every process this host spawns; the escalator walks
//! a bounded sequence of increasingly forceful strategies until a process
//! is confirmed gone; the scanner finds and kills engine processes this
//! host never spawned (orphans from a previous run).

mod escalate;
mod registry;
mod scan;
mod tree;
mod types;

pub use registry::ProcessRegistry;
pub use scan::ExternalProcess;
pub use tree::{ProcessTreeKiller, SysinfoTreeKiller};
pub use types::{ProcessInfo, SpawnSpec};
