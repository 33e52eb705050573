//! CLI surface for pixelhost.
//!
//! Declares the argument grammar and the bootstrap composition root;
//! `main.rs` only parses and dispatches.

#![deny(unsafe_code)]

// Silence unused dev-dependency warnings until tests need its helpers
#[cfg(test)]
use tokio_test as _;

pub mod bootstrap;
pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use bootstrap::{bootstrap, CliContext};

/// Pixel streaming host: supervises the rendering engine, the signaling
/// listener/worker pair, and the service endpoints.
#[derive(Parser)]
#[command(name = "pixelhost", version, about)]
pub struct Cli {
    /// Path to the settings file.
    #[arg(long, env = "PIXELHOST_CONFIG", default_value = "pixelhost.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the host: endpoints, listener/worker pair, and engine.
    Run {
        /// Skip spawning the rendering engine.
        #[arg(long)]
        no_engine: bool,
    },
    /// Show the effective configuration and validation results.
    Status,
    /// Kill stray engine processes left over from a previous run.
    Cleanup,
    /// Manage the engine program table in the listener config.
    Programs {
        #[command(subcommand)]
        action: ProgramAction,
    },
}

#[derive(Subcommand)]
pub enum ProgramAction {
    /// List configured engine programs.
    List,
    /// Add an engine program.
    Add {
        name: String,
        path: PathBuf,
        /// URL prefix clients use to select the program; must be unique.
        #[arg(long, default_value = "main")]
        urlprefix: String,
    },
    /// Remove an engine program by URL prefix.
    Remove { urlprefix: String },
}
