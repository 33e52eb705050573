//! Bounded termination escalator.
//!
//! Stop operations walk a fixed sequence: cooperative stop request, direct
//! force-kill, process-tree kill. Each stage runs only after the previous
//! stage's wait expired, and every stage ends with an exit check so the
//! escalator can stop as early as possible.

use std::time::Duration;

use pixelhost_core::HostEvent;
use tracing::{debug, info, warn};

use super::registry::ProcessRegistry;

/// Wait after a direct force-kill before concluding it failed.
const FORCE_KILL_WAIT: Duration = Duration::from_secs(2);

/// Wait after a tree kill before concluding escalation is exhausted.
const TREE_KILL_WAIT: Duration = Duration::from_secs(2);

impl ProcessRegistry {
    /// Ask a tracked process to stop and wait up to `timeout` for it to
    /// exit. Returns true iff exit was confirmed; on timeout the entry
    /// stays tracked so a caller can escalate.
    pub async fn stop_graceful(&self, pid: u32, timeout: Duration) -> bool {
        if !self.is_running(pid).await {
            debug!(pid = %pid, "stop_graceful: not tracked, treating as stopped");
            return true;
        }

        info!(pid = %pid, timeout_ms = timeout.as_millis(), "Requesting graceful stop");
        if let Err(e) = request_graceful(pid).await {
            warn!(pid = %pid, error = %e, "Graceful stop request failed");
        }

        let exited = self.wait_for_exit(pid, timeout).await;
        if !exited {
            warn!(pid = %pid, "Process did not exit within graceful timeout");
        }
        exited
    }

    /// Stop a tracked process, escalating until it is confirmed gone or
    /// every strategy is exhausted.
    ///
    /// Stage 1: graceful request, wait `graceful_timeout`.
    /// Stage 2: direct force-kill, short wait.
    /// Stage 3: process-tree kill, short wait.
    ///
    /// Returns true iff exit was confirmed. On exhaustion the entry is
    /// removed anyway (the handle is useless by then) and a
    /// [`HostEvent::ProcessError`] is emitted.
    pub async fn stop_escalating(&self, pid: u32, graceful_timeout: Duration) -> bool {
        if self.stop_graceful(pid, graceful_timeout).await {
            return true;
        }

        info!(pid = %pid, "Escalating: force kill");
        if let Err(e) = force_kill(pid).await {
            warn!(pid = %pid, error = %e, "Force kill failed");
        }
        if self.wait_for_exit(pid, FORCE_KILL_WAIT).await {
            return true;
        }

        info!(pid = %pid, "Escalating: tree kill");
        let killed = self.tree_killer.kill_tree(pid).await;
        debug!(pid = %pid, killed = killed, "Tree kill delivered");
        if self.wait_for_exit(pid, TREE_KILL_WAIT).await {
            return true;
        }

        warn!(pid = %pid, "Escalation exhausted; process may still be running");
        if let Some(info) = self.remove(pid).await {
            self.events.broadcast(HostEvent::process_error(format!(
                "failed to terminate {} (pid {pid}) after escalation",
                info.display_name
            )));
        }
        false
    }

    /// Stop every tracked process with full escalation, bounded
    /// concurrency. Returns how many were confirmed stopped.
    pub async fn stop_all_managed(&self, graceful_timeout: Duration) -> usize {
        let pids: Vec<u32> = self.list().await.into_iter().map(|p| p.pid).collect();
        if pids.is_empty() {
            return 0;
        }
        info!(count = pids.len(), "Stopping all managed processes");

        let mut handles = Vec::with_capacity(pids.len());
        for pid in pids {
            let registry = self.clone();
            handles.push(tokio::spawn(async move {
                // Permit bounds how many escalations run at once.
                let _permit = registry.stop_permits.acquire().await;
                registry.stop_escalating(pid, graceful_timeout).await
            }));
        }

        let mut stopped = 0usize;
        for handle in handles {
            if matches!(handle.await, Ok(true)) {
                stopped += 1;
            }
        }
        stopped
    }
}

/// Deliver a cooperative stop request without reaping.
#[cfg(unix)]
async fn request_graceful(pid: u32) -> std::io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => Ok(()),
        // Already gone counts as delivered.
        Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(std::io::Error::from_raw_os_error(e as i32)),
    }
}

#[cfg(windows)]
async fn request_graceful(pid: u32) -> std::io::Result<()> {
    // Without /F taskkill sends WM_CLOSE, the closest to a cooperative stop.
    tokio::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string()])
        .status()
        .await
        .map(|_| ())
}

#[cfg(unix)]
async fn force_kill(pid: u32) -> std::io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(std::io::Error::from_raw_os_error(e as i32)),
    }
}

#[cfg(windows)]
async fn force_kill(pid: u32) -> std::io::Result<()> {
    tokio::process::Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .status()
        .await
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::tree::SysinfoTreeKiller;
    use crate::process::types::SpawnSpec;
    use pixelhost_core::EventBroadcaster;
    use std::sync::Arc;

    fn registry() -> ProcessRegistry {
        ProcessRegistry::new(EventBroadcaster::new(), Arc::new(SysinfoTreeKiller::new()))
    }

    #[tokio::test]
    async fn stop_untracked_pid_is_success() {
        let reg = registry();
        assert!(reg.stop_graceful(999_999, Duration::from_millis(100)).await);
        assert!(
            reg.stop_escalating(999_999, Duration::from_millis(100))
                .await
        );
    }

    #[tokio::test]
    async fn stop_all_with_empty_registry_returns_zero() {
        let reg = registry();
        assert_eq!(reg.stop_all_managed(Duration::from_millis(100)).await, 0);
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn graceful_stop_terminates_sleeper() {
        let reg = registry();
        let spec = SpawnSpec::new("sleeper", "/bin/sleep").with_args(["30"]);
        let info = reg.spawn(spec).await.expect("spawn failed");

        let stopped = reg.stop_graceful(info.pid, Duration::from_secs(5)).await;
        assert!(stopped);
        assert!(!reg.is_running(info.pid).await);
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn escalation_force_kills_term_ignoring_process() {
        let reg = registry();
        // Shell that traps SIGTERM so only SIGKILL can take it down.
        let spec = SpawnSpec::new("stubborn", "/bin/sh").with_args([
            "-c",
            "trap '' TERM; sleep 30",
        ]);
        let info = reg.spawn(spec).await.expect("spawn failed");
        // Give the shell a moment to install the trap.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let stopped = reg
            .stop_escalating(info.pid, Duration::from_millis(500))
            .await;
        assert!(stopped);
        assert!(!reg.is_running(info.pid).await);
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn stop_all_managed_counts_confirmed_exits() {
        let reg = registry();
        for i in 0..3 {
            let spec =
                SpawnSpec::new(format!("sleeper-{i}"), "/bin/sleep").with_args(["30"]);
            reg.spawn(spec).await.expect("spawn failed");
        }
        assert_eq!(reg.count().await, 3);

        let stopped = reg.stop_all_managed(Duration::from_secs(5)).await;
        assert_eq!(stopped, 3);
        assert_eq!(reg.count().await, 0);
    }
}
