//! Settings snapshot and validation.
//!
//! The whole system treats configuration as an immutable value: every
//! operation receives a [`Settings`] clone and never reaches into shared
//! mutable state. Updates travel through [`SettingsHandle`], whose watch
//! channel is the single "configuration changed" signal that drives a
//! supervisor resync.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::info;

/// Default port for the signaling relay endpoint.
pub const DEFAULT_RELAY_PORT: u16 = 11188;

/// Default port for the worker-control endpoint.
pub const DEFAULT_WORKER_CONTROL_PORT: u16 = 8081;

/// Default port for the management API endpoint.
pub const DEFAULT_MANAGEMENT_PORT: u16 = 8082;

/// Default graceful-stop window before escalation, in milliseconds.
pub const DEFAULT_GRACEFUL_TIMEOUT_MS: u64 = 10_000;

/// Process-name substrings that identify stray engine processes.
fn default_engine_patterns() -> Vec<String> {
    [
        "UnrealEngine",
        "UnrealGame",
        "UE4",
        "UE5",
        "UE_",
        "Unreal",
        "UELaunch",
        "crashreportclient",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

fn default_relay_port() -> u16 {
    DEFAULT_RELAY_PORT
}

fn default_worker_control_port() -> u16 {
    DEFAULT_WORKER_CONTROL_PORT
}

fn default_management_port() -> u16 {
    DEFAULT_MANAGEMENT_PORT
}

fn default_graceful_timeout_ms() -> u64 {
    DEFAULT_GRACEFUL_TIMEOUT_MS
}

fn default_fps() -> u32 {
    30
}

fn default_res_x() -> u32 {
    1920
}

fn default_res_y() -> u32 {
    1080
}

fn default_true() -> bool {
    true
}

fn default_loopback() -> String {
    "127.0.0.1".to_string()
}

fn default_script_runtime() -> String {
    "node".to_string()
}

fn default_stun_server() -> String {
    "stun:stun.l.google.com:19302".to_string()
}

fn default_gpu_memory() -> u32 {
    16
}

/// Immutable configuration snapshot.
///
/// Serialized as flat JSON; every field has a default so a partial or
/// missing file still yields a usable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Path to the rendering engine executable.
    pub engine_executable: PathBuf,
    /// Project file passed to the engine, if any.
    pub engine_project: Option<PathBuf>,
    /// Directory containing the signaling listener and worker scripts.
    pub script_dir: PathBuf,
    /// Command used to run the listener/worker scripts.
    pub script_runtime: String,

    /// Port for the primary signaling relay endpoint.
    pub relay_port: u16,
    /// Port for the worker-control endpoint.
    pub worker_control_port: u16,
    /// Port for the management API endpoint.
    pub management_port: u16,

    /// Window granted for cooperative shutdown before escalation.
    pub graceful_timeout_ms: u64,
    /// Process-name substrings matched by system-wide cleanup scans.
    pub engine_process_patterns: Vec<String>,

    /// Target streaming frame rate.
    pub target_fps: u32,
    /// Horizontal streaming resolution.
    pub resolution_x: u32,
    /// Vertical streaming resolution.
    pub resolution_y: u32,
    /// Run the engine without interactive prompts.
    pub unattended: bool,
    /// Render without a visible window.
    pub render_offscreen: bool,
    /// Route engine audio through the mixer.
    pub audio_mixer: bool,

    /// Address the signaling listener binds and advertises.
    pub signal_ip: String,
    /// Address of the render machine in the listener's machine table.
    pub machine_ip: String,
    /// GPU index on the render machine.
    pub gpu_card: u32,
    /// GPU memory budget, in GiB.
    pub gpu_memory: u32,

    /// STUN server advertised to streaming clients.
    pub stun_server: String,
    /// ICE username.
    pub ice_username: String,
    /// ICE credential.
    pub ice_credential: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine_executable: PathBuf::new(),
            engine_project: None,
            script_dir: PathBuf::from("peerstream"),
            script_runtime: default_script_runtime(),
            relay_port: default_relay_port(),
            worker_control_port: default_worker_control_port(),
            management_port: default_management_port(),
            graceful_timeout_ms: default_graceful_timeout_ms(),
            engine_process_patterns: default_engine_patterns(),
            target_fps: default_fps(),
            resolution_x: default_res_x(),
            resolution_y: default_res_y(),
            unattended: default_true(),
            render_offscreen: default_true(),
            audio_mixer: default_true(),
            signal_ip: default_loopback(),
            machine_ip: default_loopback(),
            gpu_card: 0,
            gpu_memory: default_gpu_memory(),
            stun_server: default_stun_server(),
            ice_username: "1".to_string(),
            ice_credential: "1".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, falling back to defaults when the
    /// file is missing.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(std::io::Error::other)
    }

    /// Save settings to a JSON file, creating parent directories.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Settings saved");
        Ok(())
    }

    /// Validate the snapshot, collecting every problem rather than failing
    /// on the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !self.engine_executable.as_os_str().is_empty() && !self.engine_executable.exists() {
            errors.push(format!(
                "engine executable not found: {}",
                self.engine_executable.display()
            ));
        }

        for (name, port) in [
            ("relay", self.relay_port),
            ("worker-control", self.worker_control_port),
            ("management", self.management_port),
        ] {
            if port < 1024 {
                errors.push(format!("invalid {name} port: {port} (must be >= 1024)"));
            }
        }

        let ports = [
            self.relay_port,
            self.worker_control_port,
            self.management_port,
        ];
        let mut sorted = ports;
        sorted.sort_unstable();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            errors.push("port conflict: all endpoint ports must be unique".to_string());
        }

        if self.target_fps == 0 {
            errors.push("target_fps must be nonzero".to_string());
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Signaling server URL advertised to the engine and clients.
    pub fn signaling_url(&self) -> String {
        format!("ws://{}:{}", self.signal_ip, self.relay_port)
    }

    /// Graceful-stop window as a [`Duration`](std::time::Duration).
    pub fn graceful_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.graceful_timeout_ms)
    }
}

/// Shared settings holder with a change signal.
///
/// Readers take a snapshot with [`SettingsHandle::snapshot`]; the watch
/// receiver from [`SettingsHandle::subscribe`] fires exactly once per
/// update and is the only path by which configuration changes take effect.
pub struct SettingsHandle {
    tx: watch::Sender<Settings>,
}

impl SettingsHandle {
    /// Create a handle around an initial snapshot.
    pub fn new(initial: Settings) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Clone the current snapshot.
    pub fn snapshot(&self) -> Settings {
        self.tx.borrow().clone()
    }

    /// Replace the snapshot and notify subscribers.
    pub fn update(&self, next: Settings) {
        self.tx.send_replace(next);
    }

    /// Subscribe to configuration changes.
    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }
}
