//! The `cleanup` command: sweep stray engine processes.

use anyhow::Result;

use crate::bootstrap::CliContext;

pub async fn execute(ctx: &CliContext) -> Result<()> {
    let settings = ctx.settings.snapshot();
    let registry = ctx.controller.registry();

    let found = registry.scan_by_name(&settings.engine_process_patterns).await;
    if found.is_empty() {
        println!("No stray engine processes found.");
        return Ok(());
    }

    println!("Found {} engine process(es):", found.len());
    for process in &found {
        println!("  {} (pid {})", process.name, process.pid);
    }

    let attempts = registry
        .complete_cleanup(&settings.engine_process_patterns, settings.graceful_timeout())
        .await;
    let remaining = registry.scan_by_name(&settings.engine_process_patterns).await;

    println!("Cleanup finished: {attempts} termination attempt(s).");
    if remaining.is_empty() {
        println!("All engine processes are gone.");
    } else {
        println!("{} process(es) survived cleanup:", remaining.len());
        for process in remaining {
            println!("  {} (pid {})", process.name, process.pid);
        }
    }
    Ok(())
}
