//! Error types for process supervision and endpoint hosting.
//!
//! Low-level OS errors are converted to one of these kinds at the point of
//! the OS call; they never cross a crate boundary as bare `io::Error`.
//! User-visible behavior is always a boolean success plus a [`HostEvent`]
//! carrying detail — a single supervision failure never takes the whole
//! process down.
//!
//! [`HostEvent`]: crate::events::HostEvent

use std::path::PathBuf;
use thiserror::Error;

/// Errors from spawning and terminating supervised processes.
#[derive(Debug, Error)]
pub enum ProcessError {
    // === Spawn ===
    /// Executable does not exist on disk. Fatal to this spawn attempt only.
    #[error("executable not found: {path}")]
    NotFound { path: PathBuf },

    /// The OS refused to spawn the process.
    #[error("failed to start process: {0}")]
    StartFailure(String),

    // === Termination ===
    /// Cooperative shutdown did not complete within the window.
    /// Recoverable — the caller escalates to the next strategy.
    #[error("process {pid} did not exit within {timeout_ms}ms of graceful stop")]
    GracefulTimeout { pid: u32, timeout_ms: u64 },

    /// A force-kill attempt failed. Recoverable — escalation continues.
    #[error("failed to force-kill process {pid}: {detail}")]
    ForceKillFailure { pid: u32, detail: String },

    /// Every termination strategy was tried and the process survived.
    /// Terminal for this escalation call; the caller may retry the sequence.
    #[error("escalation exhausted for process {pid}")]
    EscalationExhausted { pid: u32 },

    // === Scan ===
    /// A system-wide process scan failed for one pattern. The scan
    /// continues with remaining patterns.
    #[error("system process scan failed: {0}")]
    SystemScanError(String),

    /// Untracked process id passed to a registry operation.
    #[error("process {0} is not tracked by this registry")]
    NotTracked(u32),

    /// IO operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    /// Create a `StartFailure` from any displayable error.
    pub fn start_failure(err: impl std::fmt::Display) -> Self {
        Self::StartFailure(err.to_string())
    }
}

/// Result type alias for process operations.
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Errors from the paired listener/worker supervisor.
#[derive(Debug, Error)]
pub enum PairError {
    /// Writing a configuration artifact failed. Fatal to the start or
    /// sync call — no partial process is left running.
    #[error("failed to write configuration artifact {path}: {detail}")]
    ConfigWriteFailure { path: PathBuf, detail: String },

    /// The script runtime (e.g. `node`) is not on PATH.
    #[error("script runtime '{0}' not available")]
    RuntimeMissing(String),

    /// The listener process could not be started.
    #[error("listener failed to start: {0}")]
    ListenerFailed(String),

    /// The worker process could not be started; the listener was rolled back.
    #[error("worker failed to start: {0}")]
    WorkerFailed(String),

    /// A required script file is missing from the deployment directory.
    #[error("script not found: {path}")]
    ScriptMissing { path: PathBuf },
}

/// Errors from the multi-endpoint service host.
#[derive(Debug, Error)]
pub enum HostError {
    /// Binding the listener socket failed. Endpoints of other kinds that
    /// were already running are left untouched.
    #[error("failed to bind {kind} endpoint on port {port}: {detail}")]
    StartFailure {
        kind: String,
        port: u16,
        detail: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_error_messages_carry_identity() {
        let err = ProcessError::GracefulTimeout {
            pid: 4242,
            timeout_ms: 2000,
        };
        let msg = err.to_string();
        assert!(msg.contains("4242"));
        assert!(msg.contains("2000"));
    }

    #[test]
    fn host_error_names_the_kind() {
        let err = HostError::StartFailure {
            kind: "relay".into(),
            port: 9001,
            detail: "address in use".into(),
        };
        assert!(err.to_string().contains("relay"));
        assert!(err.to_string().contains("9001"));
    }
}
