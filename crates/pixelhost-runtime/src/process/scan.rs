//! System-wide scans for engine processes this host never spawned.
//!
//! A crashed previous run leaves orphaned engine processes holding GPU
//! memory and ports. The scanner walks the OS process table by name
//! pattern, independent of the registry, so cleanup can reach processes
//! with no tracked child handle.

use std::time::Duration;

use serde::Serialize;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, info, warn};

use super::registry::ProcessRegistry;

/// Passes the full cleanup runs before giving up on convergence.
const CLEANUP_MAX_PASSES: usize = 3;

/// Settle time between cleanup passes.
const CLEANUP_SETTLE: Duration = Duration::from_millis(500);

/// A process found by a system scan, not necessarily tracked.
#[derive(Debug, Clone, Serialize)]
pub struct ExternalProcess {
    pub pid: u32,
    pub name: String,
    pub parent_pid: Option<u32>,
}

/// Snapshot the process table and return entries whose name contains any
/// of `patterns`, case-insensitive.
fn scan_snapshot(patterns: &[String]) -> Vec<ExternalProcess> {
    let mut system = System::new_all();
    system.refresh_processes(ProcessesToUpdate::All, false);

    let lowered: Vec<String> = patterns.iter().map(|p| p.to_lowercase()).collect();
    let own_pid = std::process::id();

    let mut found = Vec::new();
    for (pid, process) in system.processes() {
        if pid.as_u32() == own_pid {
            continue;
        }
        let name = process.name().to_string_lossy().to_string();
        let name_lower = name.to_lowercase();
        if lowered.iter().any(|p| name_lower.contains(p)) {
            found.push(ExternalProcess {
                pid: pid.as_u32(),
                name,
                parent_pid: process.parent().map(Pid::as_u32),
            });
        }
    }
    found
}

/// Kill every matching process directly. Returns (matched, kills delivered).
fn kill_snapshot(patterns: &[String]) -> (Vec<ExternalProcess>, usize) {
    let mut system = System::new_all();
    system.refresh_processes(ProcessesToUpdate::All, false);

    let lowered: Vec<String> = patterns.iter().map(|p| p.to_lowercase()).collect();
    let own_pid = std::process::id();

    let mut matched = Vec::new();
    let mut delivered = 0usize;
    for (pid, process) in system.processes() {
        if pid.as_u32() == own_pid {
            continue;
        }
        let name = process.name().to_string_lossy().to_string();
        if !lowered.iter().any(|p| name.to_lowercase().contains(p)) {
            continue;
        }
        let external = ExternalProcess {
            pid: pid.as_u32(),
            name,
            parent_pid: process.parent().map(Pid::as_u32),
        };
        if process.kill() {
            debug!(pid = %external.pid, name = %external.name, "Killed matching process");
            delivered += 1;
        } else {
            warn!(pid = %external.pid, name = %external.name, "Kill not delivered");
        }
        matched.push(external);
    }
    (matched, delivered)
}

impl ProcessRegistry {
    /// Find all processes on the system whose name contains any of the
    /// given patterns. Never matches the current process.
    pub async fn scan_by_name(&self, patterns: &[String]) -> Vec<ExternalProcess> {
        let patterns = patterns.to_vec();
        tokio::task::spawn_blocking(move || scan_snapshot(&patterns))
            .await
            .unwrap_or_default()
    }

    /// Kill every process matching the patterns, untracked ones included.
    /// Returns the number of kills delivered.
    pub async fn kill_matching(&self, patterns: &[String]) -> usize {
        let patterns_owned = patterns.to_vec();
        let (matched, delivered) =
            tokio::task::spawn_blocking(move || kill_snapshot(&patterns_owned))
                .await
                .unwrap_or_default();

        // Drop registry entries for anything the sweep took down.
        for external in &matched {
            self.remove(external.pid).await;
        }
        if !matched.is_empty() {
            info!(
                matched = matched.len(),
                delivered = delivered,
                "Killed matching processes"
            );
        }
        delivered
    }

    /// Run the full engine cleanup: stop everything tracked, then repeated
    /// passes of pattern kill, tree kill, and a shell kill-by-name
    /// fallback, until a scan comes back clean or the pass budget is
    /// spent.
    ///
    /// The returned count sums kill attempts across all strategies and
    /// passes. A process hit by more than one strategy is counted each
    /// time; the number is a diagnostic of effort, not a survivor census.
    /// Convergence is judged solely by the final scan being empty.
    pub async fn complete_cleanup(
        &self,
        patterns: &[String],
        graceful_timeout: Duration,
    ) -> usize {
        let mut attempts = self.stop_all_managed(graceful_timeout).await;

        for pass in 1..=CLEANUP_MAX_PASSES {
            let found = self.scan_by_name(patterns).await;
            if found.is_empty() {
                debug!(pass = pass, "Cleanup scan clean");
                break;
            }
            info!(pass = pass, found = found.len(), "Cleanup pass starting");

            attempts += self.kill_matching(patterns).await;

            // Tree kill whatever a direct kill could not reach, then fall
            // back to shell tools for anything still standing.
            let survivors = self.scan_by_name(patterns).await;
            for external in &survivors {
                attempts += self.tree_killer.kill_tree(external.pid).await;
            }
            if !survivors.is_empty() {
                for pattern in patterns {
                    attempts += shell_kill_by_name(pattern).await;
                }
            }

            if pass < CLEANUP_MAX_PASSES {
                tokio::time::sleep(CLEANUP_SETTLE).await;
            }
        }

        let remaining = self.scan_by_name(patterns).await;
        if remaining.is_empty() {
            info!(attempts = attempts, "Cleanup converged");
        } else {
            warn!(
                attempts = attempts,
                remaining = remaining.len(),
                "Cleanup did not converge"
            );
        }
        attempts
    }
}

/// Kill by name through the platform shell, counting one attempt when the
/// tool reports success. Matches process names only, like [`scan_snapshot`];
/// full-command-line matching would reach unrelated processes.
#[cfg(unix)]
async fn shell_kill_by_name(pattern: &str) -> usize {
    let status = tokio::process::Command::new("pkill")
        .args(["-KILL", pattern])
        .status()
        .await;
    usize::from(matches!(status, Ok(s) if s.success()))
}

#[cfg(windows)]
async fn shell_kill_by_name(pattern: &str) -> usize {
    let status = tokio::process::Command::new("taskkill")
        .args(["/F", "/IM", &format!("{pattern}*")])
        .status()
        .await;
    usize::from(matches!(status, Ok(s) if s.success()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::tree::SysinfoTreeKiller;
    use pixelhost_core::EventBroadcaster;
    use std::sync::Arc;

    fn registry() -> ProcessRegistry {
        ProcessRegistry::new(EventBroadcaster::new(), Arc::new(SysinfoTreeKiller::new()))
    }

    #[tokio::test]
    async fn scan_with_no_patterns_finds_nothing() {
        let reg = registry();
        let found = reg.scan_by_name(&[]).await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn scan_never_matches_self() {
        let reg = registry();
        // A pattern every process name contains would still exclude us.
        let found = reg.scan_by_name(&[String::new()]).await;
        assert!(found.iter().all(|p| p.pid != std::process::id()));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn shell_kill_with_unmatched_name_reports_nothing() {
        assert_eq!(shell_kill_by_name("no-process-is-named-this-zq9").await, 0);
    }

    #[tokio::test]
    async fn cleanup_with_unmatched_pattern_is_zero_attempts() {
        let reg = registry();
        let patterns = vec!["no-process-is-named-this-zq9".to_string()];
        let attempts = reg
            .complete_cleanup(&patterns, Duration::from_millis(100))
            .await;
        assert_eq!(attempts, 0);
    }
}
