//! Process-tree termination.
//!
//! Killing only a root pid leaves engine render and audio subprocesses
//! running. The tree killer walks the parent/child relation from a root,
//! kills leaves first, and finishes with the root so children cannot be
//! reparented mid-walk.

use std::collections::HashMap;

use async_trait::async_trait;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, warn};

/// Capability to terminate an entire process tree rooted at a pid.
#[async_trait]
pub trait ProcessTreeKiller: Send + Sync {
    /// Kill the process and all of its descendants. Returns the number of
    /// processes a kill was delivered to.
    async fn kill_tree(&self, root: u32) -> usize;
}

/// Tree killer backed by a system process table snapshot.
///
/// Falls back to a shell-level tree kill when the snapshot finds no
/// descendants but the root refuses to die, since a racing fork can slip
/// past a single snapshot.
pub struct SysinfoTreeKiller;

impl SysinfoTreeKiller {
    pub fn new() -> Self {
        Self
    }

    /// Collect `root` and all transitive children, deepest first.
    fn collect_tree(system: &System, root: u32) -> Vec<u32> {
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for (pid, process) in system.processes() {
            if let Some(parent) = process.parent() {
                children
                    .entry(parent.as_u32())
                    .or_default()
                    .push(pid.as_u32());
            }
        }

        // Depth-first; reversing the visit order yields leaves first.
        let mut visit = vec![root];
        let mut ordered = Vec::new();
        while let Some(pid) = visit.pop() {
            ordered.push(pid);
            if let Some(kids) = children.get(&pid) {
                visit.extend(kids);
            }
        }
        ordered.reverse();
        ordered
    }
}

impl Default for SysinfoTreeKiller {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessTreeKiller for SysinfoTreeKiller {
    async fn kill_tree(&self, root: u32) -> usize {
        // Snapshot and walk on a blocking thread; the process table scan is
        // not async-friendly.
        let killed = tokio::task::spawn_blocking(move || {
            let mut system = System::new_all();
            system.refresh_processes(ProcessesToUpdate::All, false);

            let mut killed = 0usize;
            for pid in Self::collect_tree(&system, root) {
                if let Some(process) = system.process(Pid::from_u32(pid)) {
                    if process.kill() {
                        debug!(pid = %pid, root = %root, "Killed tree member");
                        killed += 1;
                    } else {
                        warn!(pid = %pid, root = %root, "Kill signal not delivered");
                    }
                }
            }
            killed
        })
        .await
        .unwrap_or(0);

        if killed == 0 {
            return shell_kill_tree(root).await;
        }
        killed
    }
}

/// Last-resort tree kill through the platform shell tools.
#[cfg(unix)]
async fn shell_kill_tree(root: u32) -> usize {
    let status = tokio::process::Command::new("pkill")
        .args(["-KILL", "-P", &root.to_string()])
        .status()
        .await;
    let children_ok = matches!(status, Ok(s) if s.success());

    let root_status = tokio::process::Command::new("kill")
        .args(["-KILL", &root.to_string()])
        .status()
        .await;
    let root_ok = matches!(root_status, Ok(s) if s.success());

    usize::from(children_ok) + usize::from(root_ok)
}

#[cfg(windows)]
async fn shell_kill_tree(root: u32) -> usize {
    let status = tokio::process::Command::new("taskkill")
        .args(["/F", "/T", "/PID", &root.to_string()])
        .status()
        .await;
    usize::from(matches!(status, Ok(s) if s.success()))
}
