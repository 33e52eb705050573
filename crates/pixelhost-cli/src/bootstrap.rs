//! CLI bootstrap - the composition root.
//!
//! This module is the ONLY place where infrastructure is wired together:
//! settings handle, event channel, process registry, tree killer, pair
//! supervisor, engine controller, and service host. Command handlers
//! receive the composed context and delegate to it.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use pixelhost_core::{EventBroadcaster, Settings, SettingsHandle};
use pixelhost_runtime::{EngineController, PairSupervisor, ProcessRegistry, SysinfoTreeKiller};
use pixelhost_server::ServiceHost;
use tracing::warn;

/// Fully composed application context for CLI commands.
pub struct CliContext {
    pub settings: Arc<SettingsHandle>,
    pub events: Arc<EventBroadcaster>,
    pub controller: Arc<EngineController>,
    pub host: Arc<ServiceHost>,
}

/// Load settings and wire every component together.
pub fn bootstrap(config_path: &Path) -> Result<CliContext> {
    let settings = Settings::load(config_path)?;
    if let Err(problems) = settings.validate() {
        for problem in &problems {
            warn!(problem = %problem, "Configuration issue");
        }
    }
    let settings = Arc::new(SettingsHandle::new(settings));

    let events = EventBroadcaster::new();
    let registry = ProcessRegistry::new(events.clone(), Arc::new(SysinfoTreeKiller::new()));
    let pair = Arc::new(PairSupervisor::new(
        registry.clone(),
        events.clone(),
        settings.clone(),
    ));
    let host = Arc::new(ServiceHost::new(events.clone(), settings.clone()));
    let controller = Arc::new(
        EngineController::new(registry, pair, settings.clone(), events.clone())
            .with_endpoints(host.clone()),
    );

    Ok(CliContext {
        settings,
        events,
        controller,
        host,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_with_missing_config_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = bootstrap(&tmp.path().join("absent.json")).unwrap();
        assert_eq!(
            ctx.settings.snapshot().relay_port,
            pixelhost_core::settings::DEFAULT_RELAY_PORT
        );
    }
}
