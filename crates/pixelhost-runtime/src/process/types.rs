//! Shared types for process management.

use serde::Serialize;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::process::Child;

/// Description of a process to spawn.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    /// Human-readable name used in logs and events.
    pub display_name: String,
    /// Path to the executable.
    pub executable: PathBuf,
    /// Argument list.
    pub args: Vec<String>,
    /// Working directory; defaults to the executable's parent.
    pub working_dir: Option<PathBuf>,
}

impl SpawnSpec {
    /// Create a spec with no arguments.
    pub fn new(display_name: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            display_name: display_name.into(),
            executable: executable.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Append arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Override the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Information about a tracked process.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    /// OS process identifier, assigned at spawn.
    pub pid: u32,
    /// Human-readable name.
    pub display_name: String,
    /// Executable path the process was spawned from.
    pub executable: PathBuf,
    /// Unix timestamp when the process was spawned.
    pub started_at: u64,
}

impl ProcessInfo {
    /// Create info for a freshly spawned process.
    pub fn new(pid: u32, display_name: String, executable: PathBuf) -> Self {
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            pid,
            display_name,
            executable,
            started_at,
        }
    }
}

/// Registry entry: info plus the exclusively-owned child handle.
///
/// The handle stays in the registry until the process is confirmed gone or
/// escalation is exhausted; nothing else waits on or reaps it.
pub struct ManagedProcess {
    pub info: ProcessInfo,
    pub child: Child,
}

impl ManagedProcess {
    pub fn new(info: ProcessInfo, child: Child) -> Self {
        Self { info, child }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_spec_builder() {
        let spec = SpawnSpec::new("engine", "/opt/engine/bin")
            .with_args(["-log", "-Unattended"])
            .with_working_dir("/opt/engine");
        assert_eq!(spec.args.len(), 2);
        assert_eq!(spec.working_dir.as_deref(), Some(std::path::Path::new("/opt/engine")));
    }

    #[test]
    fn process_info_records_start_time() {
        let info = ProcessInfo::new(42, "x".into(), PathBuf::from("/bin/true"));
        assert!(info.started_at > 0);
    }
}
