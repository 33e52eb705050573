//! CLI entry point - parse, bootstrap, dispatch.

use clap::Parser;

use pixelhost_cli::{bootstrap, commands, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let ctx = bootstrap(&cli.config)?;

    let Some(command) = cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Run { no_engine } => commands::run::execute(&ctx, no_engine).await?,
        Commands::Status => commands::status::execute(&ctx).await?,
        Commands::Cleanup => commands::cleanup::execute(&ctx).await?,
        Commands::Programs { action } => commands::programs::execute(&ctx, action).await?,
    }

    Ok(())
}
