//! The `status` command: effective configuration plus validation.

use anyhow::Result;

use crate::bootstrap::CliContext;

pub async fn execute(ctx: &CliContext) -> Result<()> {
    let settings = ctx.settings.snapshot();

    println!("Configuration");
    println!("  engine executable : {}", settings.engine_executable.display());
    println!("  script directory  : {}", settings.script_dir.display());
    println!("  script runtime    : {}", settings.script_runtime);
    println!("  relay port        : {}", settings.relay_port);
    println!("  worker control    : {}", settings.worker_control_port);
    println!("  management port   : {}", settings.management_port);
    println!("  resolution        : {}x{}", settings.resolution_x, settings.resolution_y);
    println!("  target fps        : {}", settings.target_fps);
    println!("  signaling url     : {}", settings.signaling_url());

    match settings.validate() {
        Ok(()) => println!("\nConfiguration is valid."),
        Err(problems) => {
            println!("\nConfiguration problems:");
            for problem in problems {
                println!("  - {problem}");
            }
        }
    }

    let tracked = ctx.controller.registry().list().await;
    println!("\nTracked processes: {}", tracked.len());
    for info in tracked {
        println!("  {} (pid {})", info.display_name, info.pid);
    }
    Ok(())
}
