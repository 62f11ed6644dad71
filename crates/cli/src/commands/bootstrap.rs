// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `rigger bootstrap`: run one job from the contract environment.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use rig_api::{ControlPlane, NoopControlPlane};
use rig_bootstrap::{Bootstrap, BootstrapConfig};
use rig_core::Environment;

#[derive(Args, Debug)]
pub struct BootstrapArgs {
    /// Override BUILDKITE_COMMAND
    #[arg(long)]
    command: Option<String>,

    /// Override BUILDKITE_REPO
    #[arg(long)]
    repository: Option<String>,

    /// Override BUILDKITE_COMMIT
    #[arg(long)]
    commit: Option<String>,

    /// Override BUILDKITE_BRANCH
    #[arg(long)]
    branch: Option<String>,

    /// Override BUILDKITE_BUILD_PATH
    #[arg(long)]
    build_path: Option<String>,

    /// Override BUILDKITE_HOOKS_PATH
    #[arg(long)]
    hooks_path: Option<String>,

    /// Override BUILDKITE_PLUGINS_PATH
    #[arg(long)]
    plugins_path: Option<String>,

    /// Disable the pseudo-terminal for the command phase
    #[arg(long)]
    no_pty: bool,
}

/// Fold flag overrides into the contract environment.
fn effective_environment(args: &BootstrapArgs, mut env: Environment) -> Environment {
    let overrides = [
        ("BUILDKITE_COMMAND", &args.command),
        ("BUILDKITE_REPO", &args.repository),
        ("BUILDKITE_COMMIT", &args.commit),
        ("BUILDKITE_BRANCH", &args.branch),
        ("BUILDKITE_BUILD_PATH", &args.build_path),
        ("BUILDKITE_HOOKS_PATH", &args.hooks_path),
        ("BUILDKITE_PLUGINS_PATH", &args.plugins_path),
    ];
    for (key, value) in overrides {
        if let Some(value) = value {
            env.set(key, value.clone());
        }
    }
    if args.no_pty {
        env.set("BUILDKITE_PTY", "false");
    }
    env
}

pub async fn bootstrap(args: BootstrapArgs) -> Result<i32> {
    let env = effective_environment(&args, Environment::from_os());
    let config = BootstrapConfig::from_environment(&env)
        .context("incomplete job environment; is this running under an agent?")?;

    // The wire client is provided by the agent front-end; a standalone
    // bootstrap acknowledges control-plane calls locally and keeps the
    // job log on stdout.
    let api: Arc<dyn ControlPlane> = Arc::new(NoopControlPlane::new());

    let mut bootstrap = Bootstrap::new(config, api, env);
    spawn_signal_listener(bootstrap.cancel_handle());

    Ok(bootstrap.run().await)
}

/// Relay the agent's own interrupt/termination signals into the
/// sequencer's cancellation handle.
#[cfg(unix)]
fn spawn_signal_listener(cancel: rig_bootstrap::CancelHandle) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGINT handler");
                return;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = sigint.recv() => cancel.interrupt(),
                _ = sigterm.recv() => cancel.interrupt(),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_signal_listener(cancel: rig_bootstrap::CancelHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.interrupt();
        }
    });
}

#[cfg(test)]
#[path = "bootstrap_tests.rs"]
mod tests;
