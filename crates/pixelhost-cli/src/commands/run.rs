//! The `run` command: bring everything up, hold until interrupted, tear
//! everything down.

use anyhow::Result;
use tracing::{info, warn};

use crate::bootstrap::CliContext;

pub async fn execute(ctx: &CliContext, no_engine: bool) -> Result<()> {
    spawn_event_printer(ctx);
    spawn_config_watcher(ctx);

    if no_engine {
        if let Err(e) = ctx.host.start_all().await {
            warn!(error = %e, "Not all endpoints started");
        }
        if let Err(e) = ctx.controller.pair().start().await {
            warn!(error = %e, "Pair start failed");
        }
    } else if !ctx.controller.start_everything().await {
        warn!("System start incomplete; continuing with what came up");
    }

    info!("pixelhost running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    ctx.controller.stop_everything().await;
    info!("Goodbye");
    Ok(())
}

/// Print host events as they arrive for operator visibility.
fn spawn_event_printer(ctx: &CliContext) {
    let mut events = ctx.events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                info!(target: "pixelhost::events", "{json}");
            }
        }
    });
}

/// Re-apply configuration whenever the settings handle is updated.
fn spawn_config_watcher(ctx: &CliContext) {
    let mut watch = ctx.settings.subscribe();
    let controller = ctx.controller.clone();
    tokio::spawn(async move {
        while watch.changed().await.is_ok() {
            info!("Settings updated, applying configuration");
            if !controller.apply_configuration().await {
                warn!("Configuration was not fully applied");
            }
        }
    });
}
