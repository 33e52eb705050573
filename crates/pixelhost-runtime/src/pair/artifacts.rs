//! Configuration artifacts consumed by the listener and worker scripts.
//!
//! The signaling listener reads `signal.json` and the execution worker
//! reads `execue.json` from the script directory. Both are regenerated
//! from the settings snapshot before every pair start, so the scripts can
//! never observe half-updated configuration. The engine program table
//! inside `signal.json` is the one part preserved across regeneration.

use std::path::{Path, PathBuf};

use pixelhost_core::{PairError, Settings};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Listener config file name.
pub const SIGNAL_CONFIG: &str = "signal.json";

/// Worker config file name.
pub const EXECUE_CONFIG: &str = "execue.json";

/// Default credential line the listener ships with.
const DEFAULT_USERPWD: &str =
    "admin:dd2f757773f1fb6c690f3c1305c739bc4e8f35fd3e9eb69c4cdeb98d716f7eec";

/// An engine program entry in the listener's program table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineProgram {
    pub name: String,
    pub path: PathBuf,
    /// URL prefix clients use to select this program; unique per table.
    pub urlprefix: String,
    pub gpumemory: u32,
    pub preload: bool,
    pub param: String,
}

impl EngineProgram {
    /// Entry with the defaults the listener expects for a new program.
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        urlprefix: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            urlprefix: urlprefix.into(),
            gpumemory: 8,
            preload: false,
            param: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GlobalSetting {
    #[serde(rename = "WebRTCFps")]
    webrtc_fps: u32,
    #[serde(rename = "ResX")]
    res_x: u32,
    #[serde(rename = "ResY")]
    res_y: u32,
    #[serde(rename = "Unattended")]
    unattended: bool,
    #[serde(rename = "RenderOffScreen")]
    render_offscreen: bool,
    #[serde(rename = "AudioMixer")]
    audio_mixer: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GpuSlot {
    gpucard: u32,
    gpumemory: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Machine {
    ip: String,
    gpu: Vec<GpuSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IceServer {
    urls: Vec<String>,
    username: String,
    credential: String,
}

/// Full shape of `signal.json`. Field names follow the listener script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    #[serde(rename = "PORT")]
    port: u16,
    auth: bool,
    userpwd: String,
    #[serde(rename = "apiCors")]
    api_cors: bool,
    #[serde(rename = "exeUeCoolTime")]
    exe_cool_time: u32,
    #[serde(rename = "idleReleaseTime")]
    idle_release_time: u32,
    #[serde(rename = "preloadReleaseTime")]
    preload_release_time: u32,
    #[serde(rename = "mouseReleaseTime")]
    mouse_release_time: u32,
    #[serde(rename = "SignalIp")]
    signal_ip: String,
    globlesetting: GlobalSetting,
    machine: Vec<Machine>,
    ueprogram: Vec<EngineProgram>,
    #[serde(rename = "iceServers")]
    ice_servers: Vec<IceServer>,
}

impl SignalConfig {
    fn from_settings(settings: &Settings, programs: Vec<EngineProgram>) -> Self {
        Self {
            port: settings.relay_port,
            auth: false,
            userpwd: DEFAULT_USERPWD.to_string(),
            api_cors: false,
            exe_cool_time: 60,
            idle_release_time: 120,
            preload_release_time: 15_000,
            mouse_release_time: 0,
            signal_ip: settings.signal_ip.clone(),
            globlesetting: GlobalSetting {
                webrtc_fps: settings.target_fps,
                res_x: settings.resolution_x,
                res_y: settings.resolution_y,
                unattended: settings.unattended,
                render_offscreen: settings.render_offscreen,
                audio_mixer: settings.audio_mixer,
            },
            machine: vec![Machine {
                ip: settings.machine_ip.clone(),
                gpu: vec![GpuSlot {
                    gpucard: settings.gpu_card,
                    gpumemory: settings.gpu_memory,
                }],
            }],
            ueprogram: programs,
            ice_servers: vec![IceServer {
                urls: vec![settings.stun_server.clone()],
                username: settings.ice_username.clone(),
                credential: settings.ice_credential.clone(),
            }],
        }
    }

    pub fn programs(&self) -> &[EngineProgram] {
        &self.ueprogram
    }
}

/// Shape of `execue.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExecueConfig {
    #[serde(rename = "signalPort")]
    signal_port: u16,
    #[serde(rename = "signalIp")]
    signal_ip: String,
    #[serde(rename = "execueIp")]
    execue_ip: String,
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PairError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| PairError::ConfigWriteFailure {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    std::fs::write(path, json).map_err(|e| PairError::ConfigWriteFailure {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Default program table when no usable one exists yet.
fn default_programs(settings: &Settings) -> Vec<EngineProgram> {
    vec![EngineProgram::new(
        "pixelhost",
        settings.engine_executable.clone(),
        "main",
    )]
}

/// Read the listener config from the script directory.
pub fn read_signal_config(script_dir: &Path) -> Result<SignalConfig, PairError> {
    let path = script_dir.join(SIGNAL_CONFIG);
    let contents = std::fs::read_to_string(&path).map_err(|e| PairError::ConfigWriteFailure {
        path: path.clone(),
        detail: e.to_string(),
    })?;
    serde_json::from_str(&contents).map_err(|e| PairError::ConfigWriteFailure {
        path,
        detail: e.to_string(),
    })
}

/// Regenerate both artifact files from the settings snapshot.
///
/// The engine program table from an existing, parseable `signal.json` is
/// carried over; everything else is rewritten.
pub fn write_artifacts(settings: &Settings) -> Result<(), PairError> {
    let dir = &settings.script_dir;
    std::fs::create_dir_all(dir).map_err(|e| PairError::ConfigWriteFailure {
        path: dir.clone(),
        detail: e.to_string(),
    })?;

    let programs = match read_signal_config(dir) {
        Ok(existing) if !existing.ueprogram.is_empty() => {
            debug!(count = existing.ueprogram.len(), "Preserving program table");
            existing.ueprogram
        }
        _ => default_programs(settings),
    };

    let signal = SignalConfig::from_settings(settings, programs);
    write_json(&dir.join(SIGNAL_CONFIG), &signal)?;

    let execue = ExecueConfig {
        signal_port: settings.relay_port,
        signal_ip: settings.signal_ip.clone(),
        execue_ip: settings.machine_ip.clone(),
    };
    write_json(&dir.join(EXECUE_CONFIG), &execue)?;

    info!(dir = %dir.display(), "Configuration artifacts written");
    Ok(())
}

/// List the programs in the listener config.
pub fn list_programs(script_dir: &Path) -> Result<Vec<EngineProgram>, PairError> {
    Ok(read_signal_config(script_dir)?.ueprogram)
}

/// Add a program; the urlprefix must be unique within the table.
pub fn add_program(script_dir: &Path, program: EngineProgram) -> Result<(), PairError> {
    let mut config = read_signal_config(script_dir)?;
    if config
        .ueprogram
        .iter()
        .any(|p| p.urlprefix == program.urlprefix)
    {
        return Err(PairError::ConfigWriteFailure {
            path: script_dir.join(SIGNAL_CONFIG),
            detail: format!("duplicate urlprefix: {}", program.urlprefix),
        });
    }
    config.ueprogram.push(program);
    write_json(&script_dir.join(SIGNAL_CONFIG), &config)
}

/// Remove a program by urlprefix. Returns whether an entry was removed.
pub fn remove_program(script_dir: &Path, urlprefix: &str) -> Result<bool, PairError> {
    let mut config = read_signal_config(script_dir)?;
    let before = config.ueprogram.len();
    config.ueprogram.retain(|p| p.urlprefix != urlprefix);
    if config.ueprogram.len() == before {
        return Ok(false);
    }
    write_json(&script_dir.join(SIGNAL_CONFIG), &config)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_in(dir: &Path) -> Settings {
        Settings {
            script_dir: dir.to_path_buf(),
            engine_executable: PathBuf::from("/opt/engine/Engine.sh"),
            ..Settings::default()
        }
    }

    #[test]
    fn writes_both_artifacts_from_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings {
            relay_port: 12_345,
            target_fps: 45,
            ..settings_in(tmp.path())
        };

        write_artifacts(&settings).unwrap();

        let signal: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(tmp.path().join(SIGNAL_CONFIG)).unwrap(),
        )
        .unwrap();
        assert_eq!(signal["PORT"], 12_345);
        assert_eq!(signal["globlesetting"]["WebRTCFps"], 45);
        assert_eq!(signal["ueprogram"][0]["urlprefix"], "main");

        let execue: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(tmp.path().join(EXECUE_CONFIG)).unwrap(),
        )
        .unwrap();
        assert_eq!(execue["signalPort"], 12_345);
    }

    #[test]
    fn regeneration_preserves_program_table() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings_in(tmp.path());
        write_artifacts(&settings).unwrap();

        add_program(
            tmp.path(),
            EngineProgram::new("demo", "/opt/demo/Demo.sh", "demo"),
        )
        .unwrap();

        // Rewrite with different settings; the added program survives.
        let updated = Settings {
            target_fps: 60,
            ..settings.clone()
        };
        write_artifacts(&updated).unwrap();

        let programs = list_programs(tmp.path()).unwrap();
        assert_eq!(programs.len(), 2);
        assert!(programs.iter().any(|p| p.urlprefix == "demo"));
    }

    #[test]
    fn duplicate_urlprefix_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write_artifacts(&settings_in(tmp.path())).unwrap();

        let err = add_program(
            tmp.path(),
            EngineProgram::new("again", "/opt/x", "main"),
        )
        .unwrap_err();
        assert!(matches!(err, PairError::ConfigWriteFailure { .. }));
    }

    #[test]
    fn remove_program_reports_absence() {
        let tmp = tempfile::tempdir().unwrap();
        write_artifacts(&settings_in(tmp.path())).unwrap();

        assert!(!remove_program(tmp.path(), "nope").unwrap());
        assert!(remove_program(tmp.path(), "main").unwrap());
        assert!(list_programs(tmp.path()).unwrap().is_empty());
    }
}
