// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Vertice Server Daemon
//!
//! The `verticed` binary runs the Vertice orchestrator server: it loads the
//! server manifest, wires the destroy workflow and every enabled subsystem,
//! and keeps them open until Ctrl-C or SIGTERM.
//!
//! ## Commands
//!
//! - `verticed start` - Run the server in the foreground
//! - `verticed config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vertice_core::domain::server_config::ServerConfigManifest;

mod commands;
mod daemon;

use commands::ConfigCommand;

/// Vertice orchestrator server
#[derive(Parser)]
#[command(name = "verticed")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "VERTICE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to logging.level
    #[arg(long, global = true, env = "VERTICE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (text, json); defaults to logging.format
    #[arg(long, global = true, env = "VERTICE_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server in the foreground
    #[command(name = "start")]
    Start,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            let manifest = ServerConfigManifest::load_or_default(cli.config)
                .context("Failed to load configuration")?;

            let level = cli.log_level.as_deref().unwrap_or(&manifest.spec.logging.level);
            let format = cli.log_format.as_deref().unwrap_or(&manifest.spec.logging.format);
            init_logging(level, format)?;

            daemon::start_server(manifest).await
        }
        Commands::Config { command } => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), "text")?;
            commands::config::handle_command(command, cli.config).await
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    match format {
        "json" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .init(),
        "text" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .init(),
        other => anyhow::bail!("Unknown log format '{}', expected 'text' or 'json'", other),
    }

    Ok(())
}
