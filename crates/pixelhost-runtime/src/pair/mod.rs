//! Listener/worker pair supervision.
//!
//! The signaling listener (`signal.js`) and execution worker (`execue.js`)
//! only function as a unit: the worker dials the listener on startup, so
//! the listener must be up and settled first, and a worker failure rolls
//! the listener back down rather than leaving a half-started pair.

pub mod artifacts;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pixelhost_core::{EventBroadcaster, HostEvent, PairError, Settings, SettingsHandle};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::process::{ProcessRegistry, SpawnSpec};

pub use artifacts::EngineProgram;

/// Listener script file name.
const LISTENER_SCRIPT: &str = "signal.js";

/// Worker script file name.
const WORKER_SCRIPT: &str = "execue.js";

/// How long the listener gets to settle before the worker spawns.
const LISTENER_SETTLE: Duration = Duration::from_secs(2);

/// Pause between stop and start during a configuration bounce.
const BOUNCE_DELAY: Duration = Duration::from_millis(500);

/// Lifecycle of the supervised pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    Stopped,
    StartingListener,
    StartingWorker,
    Running,
    Stopping,
}

#[derive(Default)]
struct PairInner {
    listener_pid: Option<u32>,
    worker_pid: Option<u32>,
    state: Option<PairState>,
}

impl PairInner {
    fn state(&self) -> PairState {
        self.state.unwrap_or(PairState::Stopped)
    }
}

/// Supervisor for the signaling listener / execution worker pair.
pub struct PairSupervisor {
    registry: ProcessRegistry,
    events: Arc<EventBroadcaster>,
    settings: Arc<SettingsHandle>,
    inner: Mutex<PairInner>,
}

impl PairSupervisor {
    pub fn new(
        registry: ProcessRegistry,
        events: Arc<EventBroadcaster>,
        settings: Arc<SettingsHandle>,
    ) -> Self {
        Self {
            registry,
            events,
            settings,
            inner: Mutex::new(PairInner::default()),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> PairState {
        self.inner.lock().await.state()
    }

    /// Whether the pair is fully running.
    pub async fn is_running(&self) -> bool {
        self.state().await == PairState::Running
    }

    /// Check the script runtime is invocable.
    async fn ensure_runtime(&self, runtime: &str) -> Result<(), PairError> {
        let output = tokio::process::Command::new(runtime)
            .arg("--version")
            .output()
            .await;
        match output {
            Ok(out) if out.status.success() => {
                let version = String::from_utf8_lossy(&out.stdout);
                info!(runtime = %runtime, version = %version.trim(), "Script runtime found");
                Ok(())
            }
            _ => Err(PairError::RuntimeMissing(runtime.to_string())),
        }
    }

    fn script_path(settings: &Settings, script: &str) -> Result<PathBuf, PairError> {
        let path = settings.script_dir.join(script);
        if path.exists() {
            Ok(path)
        } else {
            Err(PairError::ScriptMissing { path })
        }
    }

    /// Pre-spawn checks: runtime present, artifacts written, scripts on
    /// disk. Nothing is spawned until all of these pass.
    async fn prepare(&self, settings: &Settings) -> Result<(PathBuf, PathBuf), PairError> {
        self.ensure_runtime(&settings.script_runtime).await?;
        artifacts::write_artifacts(settings)?;
        Ok((
            Self::script_path(settings, LISTENER_SCRIPT)?,
            Self::script_path(settings, WORKER_SCRIPT)?,
        ))
    }

    /// Start the pair: artifacts, listener, settle, worker.
    ///
    /// Nothing is spawned if artifact generation or the script checks fail.
    /// A worker failure rolls the listener back down, so the pair is either
    /// fully running or fully stopped on return. Only one start can be in
    /// flight at a time; a start racing another returns Ok without spawning.
    pub async fn start(&self) -> Result<(), PairError> {
        let settings = self.settings.snapshot();

        {
            // Claim the start while the lock is held so a concurrent start
            // sees a non-Stopped state and backs off.
            let mut inner = self.inner.lock().await;
            if inner.state() != PairState::Stopped {
                info!(state = ?inner.state(), "Pair start ignored, not stopped");
                return Ok(());
            }
            inner.state = Some(PairState::StartingListener);
        }

        let (listener_script, worker_script) = match self.prepare(&settings).await {
            Ok(scripts) => scripts,
            Err(e) => {
                self.set_state(PairState::Stopped).await;
                return Err(e);
            }
        };

        let listener_spec = SpawnSpec::new("signal-listener", &settings.script_runtime)
            .with_args([listener_script.to_string_lossy().into_owned()])
            .with_working_dir(&settings.script_dir);
        let listener = match self.registry.spawn(listener_spec).await {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "Listener failed to spawn");
                self.set_state(PairState::Stopped).await;
                self.events
                    .broadcast(HostEvent::pair_error(format!("listener spawn: {e}")));
                return Err(PairError::ListenerFailed(e.to_string()));
            }
        };
        self.inner.lock().await.listener_pid = Some(listener.pid);

        // Let the listener bind its port before the worker dials in.
        tokio::time::sleep(LISTENER_SETTLE).await;
        if !self.registry.is_running(listener.pid).await {
            warn!(pid = %listener.pid, "Listener exited during settle");
            self.reset_stopped().await;
            self.events
                .broadcast(HostEvent::pair_error("listener exited during settle"));
            return Err(PairError::ListenerFailed(
                "listener exited during settle".to_string(),
            ));
        }

        self.set_state(PairState::StartingWorker).await;
        let worker_spec = SpawnSpec::new("execue-worker", &settings.script_runtime)
            .with_args([worker_script.to_string_lossy().into_owned()])
            .with_working_dir(&settings.script_dir);
        let worker = match self.registry.spawn(worker_spec).await {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "Worker failed to spawn, rolling back listener");
                self.registry
                    .stop_escalating(listener.pid, settings.graceful_timeout())
                    .await;
                self.reset_stopped().await;
                self.events
                    .broadcast(HostEvent::pair_error(format!("worker spawn: {e}")));
                return Err(PairError::WorkerFailed(e.to_string()));
            }
        };

        {
            let mut inner = self.inner.lock().await;
            inner.worker_pid = Some(worker.pid);
            inner.state = Some(PairState::Running);
        }
        info!(
            listener = %listener.pid,
            worker = %worker.pid,
            "Pair running"
        );
        self.events.broadcast(HostEvent::pair_started(format!(
            "listener {} / worker {}",
            listener.pid, worker.pid
        )));
        Ok(())
    }

    /// Stop the pair: worker first, then listener, each with escalation.
    /// Individual stop outcomes are ignored; the pair always ends Stopped.
    pub async fn stop(&self) {
        let settings = self.settings.snapshot();
        let (worker, listener) = {
            let mut inner = self.inner.lock().await;
            if inner.state() == PairState::Stopped {
                return;
            }
            inner.state = Some(PairState::Stopping);
            (inner.worker_pid.take(), inner.listener_pid.take())
        };

        if let Some(pid) = worker {
            self.registry
                .stop_escalating(pid, settings.graceful_timeout())
                .await;
        }
        if let Some(pid) = listener {
            self.registry
                .stop_escalating(pid, settings.graceful_timeout())
                .await;
        }

        self.set_state(PairState::Stopped).await;
        info!("Pair stopped");
        self.events
            .broadcast(HostEvent::pair_stopped("listener and worker stopped"));
    }

    /// Apply the current settings snapshot to the artifacts, bouncing the
    /// pair when it is running. Returns whether a bounce happened.
    ///
    /// The bounce is not atomic: the pair is briefly fully down between
    /// stop and start.
    pub async fn sync_configuration(&self) -> Result<bool, PairError> {
        let was_running = self.is_running().await;
        if !was_running {
            artifacts::write_artifacts(&self.settings.snapshot())?;
            return Ok(false);
        }

        info!("Configuration changed, bouncing pair");
        self.stop().await;
        tokio::time::sleep(BOUNCE_DELAY).await;
        self.start().await?;
        Ok(true)
    }

    /// List engine programs from the listener config.
    pub async fn list_programs(&self) -> Result<Vec<EngineProgram>, PairError> {
        let settings = self.settings.snapshot();
        artifacts::list_programs(&settings.script_dir)
    }

    /// Add an engine program, bouncing the pair if it is running.
    pub async fn add_program(&self, program: EngineProgram) -> Result<(), PairError> {
        let settings = self.settings.snapshot();
        artifacts::add_program(&settings.script_dir, program)?;
        if self.is_running().await {
            self.stop().await;
            tokio::time::sleep(BOUNCE_DELAY).await;
            self.start().await?;
        }
        Ok(())
    }

    /// Remove an engine program by urlprefix, bouncing the pair if it is
    /// running. Returns whether an entry was removed.
    pub async fn remove_program(&self, urlprefix: &str) -> Result<bool, PairError> {
        let settings = self.settings.snapshot();
        let removed = artifacts::remove_program(&settings.script_dir, urlprefix)?;
        if removed && self.is_running().await {
            self.stop().await;
            tokio::time::sleep(BOUNCE_DELAY).await;
            self.start().await?;
        }
        Ok(removed)
    }

    async fn set_state(&self, state: PairState) {
        self.inner.lock().await.state = Some(state);
    }

    async fn reset_stopped(&self) {
        let mut inner = self.inner.lock().await;
        inner.listener_pid = None;
        inner.worker_pid = None;
        inner.state = Some(PairState::Stopped);
    }
}
