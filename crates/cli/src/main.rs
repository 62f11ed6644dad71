// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! rigger - build-job execution agent

mod commands;

use clap::{Parser, Subcommand};

use commands::bootstrap;

#[derive(Parser)]
#[command(name = "rigger", version, about = "Build-job execution agent")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one job: setup, plugins, checkout, command, artifacts
    Bootstrap(bootstrap::BootstrapArgs),
}

#[tokio::main]
async fn main() {
    setup_logging();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Bootstrap(args) => match bootstrap::bootstrap(args).await {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                1
            }
        },
    };

    std::process::exit(exit_code);
}

/// Log to stderr so the job log (stdout) stays clean for the control
/// plane's copy.
fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
