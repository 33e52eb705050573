//! Process registry: spawn, track, and observe exit.
//!
//! All registry state lives behind one async mutex. Mutations (insert on
//! spawn, remove on confirmed exit) happen inside the critical section;
//! waits and kills happen outside it, re-acquiring only to commit. The
//! invariant: an entry holds a live child handle exactly as long as the
//! escalator believes the process is running.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pixelhost_core::{EventBroadcaster, HostEvent, ProcessError, ProcessResult};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use super::tree::ProcessTreeKiller;
use super::types::{ManagedProcess, ProcessInfo, SpawnSpec};

/// How often exit watchers and stop waiters poll for process exit.
pub(super) const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Concurrency cap for bulk stop operations.
const STOP_CONCURRENCY: usize = 8;

/// Registry of processes this host spawned.
#[derive(Clone)]
pub struct ProcessRegistry {
    pub(super) processes: Arc<Mutex<HashMap<u32, ManagedProcess>>>,
    pub(super) events: Arc<EventBroadcaster>,
    pub(super) tree_killer: Arc<dyn ProcessTreeKiller>,
    pub(super) stop_permits: Arc<Semaphore>,
}

impl ProcessRegistry {
    /// Create a registry that reports through `events` and terminates
    /// process trees through `tree_killer`.
    pub fn new(events: Arc<EventBroadcaster>, tree_killer: Arc<dyn ProcessTreeKiller>) -> Self {
        Self {
            processes: Arc::new(Mutex::new(HashMap::new())),
            events,
            tree_killer,
            stop_permits: Arc::new(Semaphore::new(STOP_CONCURRENCY)),
        }
    }

    /// Spawn a process and register it.
    ///
    /// Attaches stdout/stderr line capture and an exit watcher that removes
    /// the entry and emits [`HostEvent::ProcessStopped`] when the process
    /// goes away on its own.
    pub async fn spawn(&self, spec: SpawnSpec) -> ProcessResult<ProcessInfo> {
        // Bare command names (`node`) resolve through PATH at spawn time;
        // only explicit paths can be checked up front.
        let is_bare_command = spec.executable.components().count() == 1
            && !spec.executable.is_absolute();
        if !is_bare_command && !spec.executable.exists() {
            return Err(ProcessError::NotFound {
                path: spec.executable.clone(),
            });
        }

        let working_dir = spec.working_dir.clone().or_else(|| {
            spec.executable
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
        });

        let mut cmd = Command::new(&spec.executable);
        cmd.args(&spec.args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        info!(
            name = %spec.display_name,
            executable = %spec.executable.display(),
            "Spawning process"
        );

        let mut child = cmd.spawn().map_err(ProcessError::start_failure)?;
        let pid = child
            .id()
            .ok_or_else(|| ProcessError::StartFailure("child has no PID".to_string()))?;

        self.spawn_output_readers(&mut child, &spec.display_name);

        let info = ProcessInfo::new(pid, spec.display_name.clone(), spec.executable.clone());
        {
            let mut processes = self.processes.lock().await;
            processes.insert(pid, ManagedProcess::new(info.clone(), child));
        }

        self.events
            .broadcast(HostEvent::process_started(pid, &spec.display_name));
        info!(pid = %pid, name = %spec.display_name, "Process started");

        self.spawn_exit_watcher(pid);

        Ok(info)
    }

    fn spawn_output_readers(&self, child: &mut tokio::process::Child, name: &str) {
        if let Some(stdout) = child.stdout.take() {
            let tag = name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(target: "pixelhost::child", "[{tag}] {line}");
                }
                debug!(name = %tag, "stdout reader task exiting");
            });
        }

        if let Some(stderr) = child.stderr.take() {
            let tag = name.to_string();
            let events = self.events.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(target: "pixelhost::child", "[{tag} err] {line}");
                    events.broadcast(HostEvent::process_error(format!("[{tag}] {line}")));
                }
                debug!(name = %tag, "stderr reader task exiting");
            });
        }
    }

    /// Watch for the process exiting on its own; remove and notify when it
    /// does. The watcher stops as soon as the entry disappears (a stop
    /// operation removed it first).
    fn spawn_exit_watcher(&self, pid: u32) {
        let registry = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(EXIT_POLL_INTERVAL * 5).await;
                let mut processes = registry.processes.lock().await;
                let Some(entry) = processes.get_mut(&pid) else {
                    break;
                };
                match entry.child.try_wait() {
                    Ok(Some(status)) => {
                        let info = processes.remove(&pid).map(|m| m.info);
                        drop(processes);
                        if let Some(info) = info {
                            info!(
                                pid = %pid,
                                name = %info.display_name,
                                status = ?status,
                                "Process exited"
                            );
                            registry
                                .events
                                .broadcast(HostEvent::process_stopped(pid, info.display_name));
                        }
                        break;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(pid = %pid, error = %e, "Exit watcher failed to query process");
                        break;
                    }
                }
            }
        });
    }

    /// List info for every tracked process.
    pub async fn list(&self) -> Vec<ProcessInfo> {
        let processes = self.processes.lock().await;
        processes.values().map(|p| p.info.clone()).collect()
    }

    /// Check whether a pid is tracked.
    pub async fn is_running(&self, pid: u32) -> bool {
        self.processes.lock().await.contains_key(&pid)
    }

    /// Number of tracked processes.
    pub async fn count(&self) -> usize {
        self.processes.lock().await.len()
    }

    /// Poll until the tracked process exits or `timeout` elapses.
    ///
    /// On confirmed exit the entry is removed and `ProcessStopped` is
    /// emitted. Returns true iff exit was confirmed. The lock is held only
    /// for each individual `try_wait` probe, never across a sleep.
    pub(super) async fn wait_for_exit(&self, pid: u32, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut processes = self.processes.lock().await;
                let Some(entry) = processes.get_mut(&pid) else {
                    // Already removed: the exit watcher or another stop
                    // confirmed the exit.
                    return true;
                };
                match entry.child.try_wait() {
                    Ok(Some(_)) => {
                        let info = processes.remove(&pid).map(|m| m.info);
                        drop(processes);
                        if let Some(info) = info {
                            self.events
                                .broadcast(HostEvent::process_stopped(pid, info.display_name));
                        }
                        return true;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(pid = %pid, error = %e, "Failed to query process state");
                    }
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
    }

    /// Drop a tracked entry without waiting, returning its info.
    pub(super) async fn remove(&self, pid: u32) -> Option<ProcessInfo> {
        let mut processes = self.processes.lock().await;
        processes.remove(&pid).map(|m| m.info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::tree::SysinfoTreeKiller;

    fn registry() -> ProcessRegistry {
        ProcessRegistry::new(EventBroadcaster::new(), Arc::new(SysinfoTreeKiller::new()))
    }

    #[tokio::test]
    async fn registry_starts_empty() {
        let reg = registry();
        assert_eq!(reg.count().await, 0);
        assert!(!reg.is_running(1).await);
    }

    #[tokio::test]
    async fn spawn_missing_executable_is_not_found() {
        let reg = registry();
        let spec = SpawnSpec::new("ghost", "/nonexistent/binary-for-test");
        let err = reg.spawn(spec).await.unwrap_err();
        assert!(matches!(err, ProcessError::NotFound { .. }));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn spawn_tracks_and_exit_watcher_removes() {
        let reg = registry();
        let mut events = reg.events.subscribe();

        let spec = SpawnSpec::new("true", "/bin/true");
        let info = reg.spawn(spec).await.expect("spawn failed");
        assert!(reg.is_running(info.pid).await || reg.count().await == 0);

        // The watcher should observe the exit and remove the entry.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while reg.is_running(info.pid).await {
            assert!(tokio::time::Instant::now() < deadline, "watcher never fired");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        // Started then stopped, in that order.
        let first = events.recv().await.unwrap();
        assert!(matches!(first, HostEvent::ProcessStarted { .. }));
        let second = events.recv().await.unwrap();
        assert!(matches!(second, HostEvent::ProcessStopped { .. }));
    }
}
