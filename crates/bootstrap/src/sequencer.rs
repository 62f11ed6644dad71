// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bootstrap sequencer: one loop over phase descriptors.
//!
//! Phases run in a fixed order with hooks woven around each body
//! (global, then local, then plugins in declared order). Whether a phase
//! error is fatal is a property of its descriptor: setup, plugin and
//! checkout failures end the job with their exit code; command and
//! artifact failures are captured, leave the remaining phases running,
//! and surface as the final exit code. tearDown always runs.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use rig_api::ControlPlane;
use rig_artifact::{collect, ArtifactUploader, CollectOptions, UploadConfig};
use rig_core::{hook_path, Environment, HookName, HookScope, Plugin};
use rig_process::{
    stream_logs, HeaderTimesStreamer, OutputPipeline, ProcessHandle, Redactor,
};

use crate::checkout::default_checkout;
use crate::command::{default_command, CommandError};
use crate::config::BootstrapConfig;
use crate::hook::{run_hook, HookError, HookOutcome};
use crate::plugins::{materialize, plugin_hook_path};
use crate::shell::JobShell;

#[cfg(not(windows))]
const PATH_LIST_SEPARATOR: char = ':';
#[cfg(windows)]
const PATH_LIST_SEPARATOR: char = ';';

/// A phase failure, carrying the exit code the job should end with if
/// the failure is (or becomes) terminal.
#[derive(Debug)]
pub struct PhaseError {
    pub message: String,
    pub exit_code: i32,
}

impl PhaseError {
    fn new(message: impl Into<String>, exit_code: i32) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    fn failed(message: impl fmt::Display) -> Self {
        Self::new(message.to_string(), 1)
    }
}

impl fmt::Display for PhaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<HookError> for PhaseError {
    fn from(e: HookError) -> Self {
        Self::failed(e)
    }
}

/// One phase of the bootstrap, as data: its hook pair and whether its
/// errors terminate the job.
struct PhaseSpec {
    name: &'static str,
    pre: Option<HookName>,
    post: Option<HookName>,
    fatal: bool,
}

const PHASES: &[PhaseSpec] = &[
    PhaseSpec {
        name: "plugin",
        pre: None,
        post: None,
        fatal: true,
    },
    PhaseSpec {
        name: "checkout",
        pre: Some(HookName::PreCheckout),
        post: Some(HookName::PostCheckout),
        fatal: true,
    },
    PhaseSpec {
        name: "command",
        pre: Some(HookName::PreCommand),
        post: Some(HookName::PostCommand),
        fatal: false,
    },
    PhaseSpec {
        name: "artifact",
        pre: Some(HookName::PreArtifact),
        post: Some(HookName::PostArtifact),
        fatal: false,
    },
];

struct CancelInner {
    active: Arc<Mutex<Option<ProcessHandle>>>,
    grace: Duration,
    interrupts: AtomicUsize,
}

/// Cancellation entry point handed to the signal listener.
///
/// The first interrupt sends a graceful signal to the active child and
/// arms a grace timer; the timer expiring, or a second interrupt,
/// escalates to a hard termination. Post-command hooks and tearDown
/// still run afterwards.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

impl CancelHandle {
    fn new(active: Arc<Mutex<Option<ProcessHandle>>>, grace: Duration) -> Self {
        Self {
            inner: Arc::new(CancelInner {
                active,
                grace,
                interrupts: AtomicUsize::new(0),
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.interrupts.load(Ordering::SeqCst) > 0
    }

    /// Deliver one interrupt.
    pub fn interrupt(&self) {
        let previous = self.inner.interrupts.fetch_add(1, Ordering::SeqCst);
        let handle = self.inner.active.lock().clone();

        if previous == 0 {
            tracing::info!("interrupt received, signalling the running child");
            if let Some(child) = &handle {
                if let Err(e) = child.interrupt() {
                    tracing::warn!(error = %e, "failed to interrupt child");
                }
            }

            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                tokio::time::sleep(inner.grace).await;
                if let Some(child) = handle {
                    if !child.is_done() {
                        tracing::warn!("grace period expired, terminating child");
                        if let Err(e) = child.terminate() {
                            tracing::warn!(error = %e, "failed to terminate child");
                        }
                    }
                }
            });
        } else {
            tracing::warn!("second interrupt received, terminating child");
            if let Some(child) = handle {
                if let Err(e) = child.terminate() {
                    tracing::warn!(error = %e, "failed to terminate child");
                }
            }
        }
    }
}

/// The job executor.
pub struct Bootstrap {
    config: BootstrapConfig,
    api: Arc<dyn ControlPlane>,
    shell: JobShell,
    plugins: Vec<Plugin>,
    cancel: CancelHandle,
    consumer_tasks: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    command_exit: i32,
}

impl Bootstrap {
    /// Build the executor and start the output pipeline consumers.
    ///
    /// `base_env` is the environment children start from (the OS
    /// environment in production). Secrets derived from it are redacted
    /// from all log output.
    pub fn new(
        config: BootstrapConfig,
        api: Arc<dyn ControlPlane>,
        base_env: Environment,
    ) -> Self {
        let redactor = Redactor::from_environment(&base_env, &config.redacted_vars);
        let pipeline = Arc::new(OutputPipeline::new(redactor));

        // Subscribe consumers before any line can flow.
        let log_rx = pipeline.subscribe("log-streamer", 4096);
        let mut header_rx = pipeline.subscribe("header-times", 4096);

        let header_times = HeaderTimesStreamer::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut consumer_tasks = Vec::new();

        let log_api = Arc::clone(&api);
        let log_job_id = config.job.id.clone();
        consumer_tasks.push(tokio::spawn(async move {
            stream_logs(log_rx, log_api, &log_job_id, true).await;
        }));

        let scanner = header_times.clone();
        consumer_tasks.push(tokio::spawn(async move {
            while let Some(line) = header_rx.recv().await {
                scanner.scan(&line.text);
            }
        }));

        let streamer = header_times;
        let times_api = Arc::clone(&api);
        let times_job_id = config.job.id.clone();
        consumer_tasks.push(tokio::spawn(async move {
            streamer.stream(times_api, &times_job_id, shutdown_rx).await;
        }));

        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let shell = JobShell::new(base_env, cwd, pipeline);
        let cancel = CancelHandle::new(shell.active_handle(), config.cancel_grace);

        Self {
            config,
            api,
            shell,
            plugins: Vec::new(),
            cancel,
            consumer_tasks,
            shutdown_tx,
            command_exit: 0,
        }
    }

    /// Cancellation entry point for the signal listener.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run the job to completion and return the agent's exit code.
    pub async fn run(&mut self) -> i32 {
        let mut exit_code = match self.set_up().await {
            Ok(()) => self.run_phases().await,
            Err(e) => {
                tracing::error!(error = %e, "error setting up bootstrap");
                self.shell.comment(&format!("Setup failed: {}", e));
                e.exit_code
            }
        };

        // tearDown runs exactly once, whatever happened above.
        if let Err(e) = self.tear_down().await {
            tracing::error!(error = %e, "error tearing down bootstrap");
            if exit_code == 0 {
                exit_code = e.exit_code;
            }
        }

        self.finish_streams().await;
        exit_code
    }

    /// Initialize the job environment and fire the global environment
    /// hook (before plugins, so it can vet which plugins may run).
    async fn set_up(&mut self) -> Result<(), PhaseError> {
        if let Some(bin_path) = &self.config.bin_path {
            let path = self.shell.env.value("PATH").to_string();
            self.shell.env.set(
                "PATH",
                format!("{}{}{}", bin_path.display(), PATH_LIST_SEPARATOR, path),
            );
        }

        let checkout_path = self.config.checkout_path();
        self.shell.env.set(
            "BUILDKITE_BUILD_CHECKOUT_PATH",
            checkout_path.display().to_string(),
        );

        // No interactive git or ssh prompts, ever.
        self.shell.env.set("GIT_TERMINAL_PROMPT", "0");

        self.run_scoped_hook(HookScope::Global, HookName::Environment)
            .await
    }

    async fn run_phases(&mut self) -> i32 {
        let mut soft_exit = 0i32;

        for spec in PHASES {
            if spec.name == "artifact"
                && (self.config.job.artifact_paths.is_empty() || self.cancel.is_cancelled())
            {
                continue;
            }

            match self.run_phase(spec).await {
                Ok(()) => {}
                Err(e) if spec.fatal => {
                    tracing::error!(phase = spec.name, error = %e, "fatal phase error");
                    self.shell.comment(&format!("{}", e));
                    return e.exit_code;
                }
                Err(e) => {
                    tracing::warn!(phase = spec.name, error = %e, "phase error");
                    self.shell.comment(&format!("{}", e));
                    if soft_exit == 0 {
                        soft_exit = e.exit_code;
                    }
                }
            }
        }

        // The command's exit code is the failure source of record.
        if self.command_exit != 0 {
            self.command_exit
        } else {
            soft_exit
        }
    }

    async fn run_phase(&mut self, spec: &PhaseSpec) -> Result<(), PhaseError> {
        if let Some(pre) = spec.pre {
            self.run_hook_scopes(pre).await?;
        }

        let checkout_path_before = self
            .shell
            .env
            .value("BUILDKITE_BUILD_CHECKOUT_PATH")
            .to_string();

        match spec.name {
            "plugin" => self.plugin_body().await?,
            "checkout" => self.checkout_body().await?,
            "command" => self.command_body().await?,
            "artifact" => self.artifact_body().await?,
            other => unreachable!("unknown phase {}", other),
        }

        if let Some(post) = spec.post {
            self.run_hook_scopes(post).await?;
        }

        // A post-checkout hook may relocate the checkout; follow it.
        if spec.name == "checkout" {
            let checkout_path_now = self
                .shell
                .env
                .value("BUILDKITE_BUILD_CHECKOUT_PATH")
                .to_string();
            if !checkout_path_before.is_empty() && checkout_path_before != checkout_path_now {
                self.shell.header(&format!(
                    "A post-checkout hook has changed the working directory to \"{}\"",
                    checkout_path_now
                ));
                self.shell
                    .chdir(PathBuf::from(&checkout_path_now))
                    .map_err(PhaseError::failed)?;
            }
        }

        Ok(())
    }

    // === Phase bodies ===

    async fn plugin_body(&mut self) -> Result<(), PhaseError> {
        if self.config.job.plugins_json.is_empty() {
            return Ok(());
        }

        self.shell.header("Setting up plugins");

        if self.config.plugins_path.as_os_str().is_empty() {
            return Err(PhaseError::failed(
                "cannot check out plugins without a plugins-path",
            ));
        }

        self.plugins = Plugin::from_json(&self.config.job.plugins_json)
            .map_err(|e| PhaseError::failed(format!("failed to parse plugin definition: {}", e)))?;

        for plugin in &self.plugins {
            materialize(
                &self.shell,
                plugin,
                &self.config.plugins_path,
                self.config.job.verify_ssh_fingerprints,
            )
            .await
            .map_err(PhaseError::failed)?;
        }

        // Make each plugin's configuration visible to later phases (the
        // command child included), then fire their environment hooks.
        let plugins = self.plugins.clone();
        for plugin in &plugins {
            let config_env = plugin.configuration_to_environment();
            self.shell.env.apply(&config_env);
        }

        self.run_plugin_hooks(HookName::Environment).await
    }

    async fn checkout_body(&mut self) -> Result<(), PhaseError> {
        let checkout_path =
            PathBuf::from(self.shell.env.value("BUILDKITE_BUILD_CHECKOUT_PATH"));

        if self.config.job.clean_checkout {
            self.shell.header("Cleaning pipeline checkout");
            self.shell
                .comment(&format!("Removing {}", checkout_path.display()));
            match std::fs::remove_dir_all(&checkout_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(PhaseError::failed(format!(
                        "failed to remove {}: {}",
                        checkout_path.display(),
                        e
                    )))
                }
            }
        }

        self.shell.header("Preparing build directory");
        std::fs::create_dir_all(&checkout_path).map_err(|e| {
            PhaseError::failed(format!(
                "failed to create {}: {}",
                checkout_path.display(),
                e
            ))
        })?;
        self.shell
            .chdir(&checkout_path)
            .map_err(PhaseError::failed)?;

        // A custom checkout hook (global first, then plugins) replaces
        // the default git checkout entirely.
        let global_checkout = hook_path(&self.config.hooks_path, HookName::Checkout);
        if global_checkout.exists() {
            self.run_scoped_hook(HookScope::Global, HookName::Checkout)
                .await
        } else if self.plugin_hook_exists(HookName::Checkout) {
            self.run_plugin_hooks(HookName::Checkout).await
        } else {
            default_checkout(&self.shell, &self.config, &self.api)
                .await
                .map_err(PhaseError::failed)
        }
    }

    async fn command_body(&mut self) -> Result<(), PhaseError> {
        // A custom command hook replaces the default runner; its exit
        // code is the command's.
        let global_command = hook_path(&self.config.hooks_path, HookName::Command);
        let local_command =
            hook_path(&self.shell.getwd().join(".buildkite/hooks"), HookName::Command);

        let exit_code = if global_command.exists() {
            self.run_command_hook(&global_command, "global command", None)
                .await?
        } else if local_command.exists() {
            self.run_command_hook(&local_command, "local command", None)
                .await?
        } else if self.plugin_hook_exists(HookName::Command) {
            let mut code = 0;
            for plugin in self.plugins.clone() {
                let path = plugin_hook_path(&plugin, &self.config.plugins_path, HookName::Command)
                    .map_err(PhaseError::failed)?;
                if !path.exists() {
                    continue;
                }
                let label = format!("plugin {} command", plugin.label());
                let extra = plugin.configuration_to_environment();
                code = self.run_command_hook(&path, &label, Some(extra)).await?;
                if code != 0 {
                    break;
                }
            }
            code
        } else {
            // Command failures never skip post-command hooks, so every
            // error shape collapses to an exit code here.
            match default_command(&self.shell, &self.config).await {
                Ok(code) => code,
                Err(CommandError::Shell(e)) => {
                    // The command could not even be spawned.
                    tracing::error!(error = %e, "failed to start the command");
                    self.shell.comment(&format!("{}", e));
                    -1
                }
                Err(e) => {
                    tracing::error!(error = %e, "refusing to run the command");
                    self.shell.comment(&format!("{}", e));
                    1
                }
            }
        };

        self.command_exit = exit_code;
        if exit_code != 0 {
            // Expand the failed command's section in the UI.
            self.shell.pipeline().write_line("^^^ +++");
        }
        self.set_command_exit_status();
        Ok(())
    }

    async fn artifact_body(&mut self) -> Result<(), PhaseError> {
        let paths = self.config.job.artifact_paths.clone();
        self.shell.header("Uploading artifacts");

        let mut opts = CollectOptions::new(self.shell.getwd());
        opts.skip_symlinks = self.config.upload_skip_symlinks;
        let collect_paths = paths.clone();
        let artifacts = tokio::task::spawn_blocking(move || collect(&collect_paths, &opts))
            .await
            .map_err(PhaseError::failed)?
            .map_err(PhaseError::failed)?;

        if artifacts.is_empty() {
            self.shell
                .comment(&format!("No files matched paths: {}", paths));
            return Ok(());
        }

        self.shell.comment(&format!(
            "Found {} file(s) that match \"{}\"",
            artifacts.len(),
            paths
        ));

        let uploader = ArtifactUploader::new(
            Arc::clone(&self.api),
            UploadConfig::new(
                self.config.job.id.clone(),
                self.config.job.artifact_destination.clone(),
            ),
        );
        uploader.upload(artifacts).await.map_err(PhaseError::failed)
    }

    /// Fire pre-exit hooks. Runs whatever happened earlier in the job.
    async fn tear_down(&mut self) -> Result<(), PhaseError> {
        self.run_hook_scopes(HookName::PreExit).await
    }

    // === Hook plumbing ===

    /// Run one extension point through every scope: global, then local,
    /// then each plugin in declared order.
    async fn run_hook_scopes(&mut self, name: HookName) -> Result<(), PhaseError> {
        self.run_scoped_hook(HookScope::Global, name).await?;
        self.run_scoped_hook(HookScope::Local, name).await?;
        self.run_plugin_hooks(name).await
    }

    async fn run_scoped_hook(
        &mut self,
        scope: HookScope,
        name: HookName,
    ) -> Result<(), PhaseError> {
        let dir = match scope {
            HookScope::Global => self.config.hooks_path.clone(),
            HookScope::Local => self.shell.getwd().join(".buildkite").join("hooks"),
            HookScope::Plugin => return self.run_plugin_hooks(name).await,
        };
        if dir.as_os_str().is_empty() {
            return Ok(());
        }

        let path = hook_path(&dir, name);
        let label = format!("{} {}", scope, name);
        let outcome = run_hook(&self.shell, &label, &path, None).await?;
        if let Some(outcome) = outcome {
            self.apply_hook_outcome(&label, outcome)?;
        }
        Ok(())
    }

    async fn run_plugin_hooks(&mut self, name: HookName) -> Result<(), PhaseError> {
        for plugin in self.plugins.clone() {
            let path = plugin_hook_path(&plugin, &self.config.plugins_path, name)
                .map_err(PhaseError::failed)?;
            let label = format!("plugin {} {}", plugin.label(), name);
            let extra = plugin.configuration_to_environment();
            let outcome = run_hook(&self.shell, &label, &path, Some(&extra)).await?;
            if let Some(outcome) = outcome {
                self.apply_hook_outcome(&label, outcome)?;
            }
        }
        Ok(())
    }

    /// Run a `command` hook: unlike other hooks its non-zero exit is the
    /// command failing, not a hook error.
    async fn run_command_hook(
        &mut self,
        path: &std::path::Path,
        label: &str,
        extra: Option<Environment>,
    ) -> Result<i32, PhaseError> {
        let outcome = run_hook(&self.shell, label, path, extra.as_ref()).await?;
        let Some(outcome) = outcome else {
            return Ok(0);
        };

        self.record_last_hook_exit(outcome.exit_code);
        if outcome.exit_code == 0 {
            self.apply_environment_changes(label, &outcome);
        }
        Ok(outcome.exit_code)
    }

    /// Bookkeeping after any non-command hook ran: exit status into the
    /// environment, diff applied, changed configuration folded back.
    fn apply_hook_outcome(&mut self, label: &str, outcome: HookOutcome) -> Result<(), PhaseError> {
        self.record_last_hook_exit(outcome.exit_code);

        if outcome.exit_code != 0 {
            return Err(PhaseError::new(
                format!("the {} hook exited with status {}", label, outcome.exit_code),
                outcome.exit_code,
            ));
        }

        self.apply_environment_changes(label, &outcome);
        Ok(())
    }

    fn apply_environment_changes(&mut self, label: &str, outcome: &HookOutcome) {
        if outcome.diff.is_empty() {
            return;
        }

        tracing::debug!(hook = label, changes = outcome.diff.len(), "applying environment changes");
        self.shell.env.apply(&outcome.diff);

        let changed = self.config.read_from_environment(&outcome.diff);
        if !changed.is_empty() {
            self.shell.header("Bootstrap configuration has changed");
            for key in changed {
                self.shell.comment(&format!(
                    "{} is now {:?}",
                    key,
                    self.shell.env.value(&key)
                ));
            }
        }
    }

    fn record_last_hook_exit(&mut self, exit_code: i32) {
        self.shell
            .env
            .set("BUILDKITE_LAST_HOOK_EXIT_STATUS", exit_code.to_string());
    }

    fn set_command_exit_status(&mut self) {
        self.shell
            .env
            .set("BUILDKITE_COMMAND_EXIT_STATUS", self.command_exit.to_string());
    }

    fn plugin_hook_exists(&self, name: HookName) -> bool {
        self.plugins.iter().any(|plugin| {
            plugin_hook_path(plugin, &self.config.plugins_path, name)
                .map(|path| path.exists())
                .unwrap_or(false)
        })
    }

    /// Close the pipeline and wait for every consumer to drain, so the
    /// uploaded log and header times are complete before we exit.
    async fn finish_streams(&mut self) {
        self.shell.pipeline().close();
        let _ = self.shutdown_tx.send(true);
        for task in self.consumer_tasks.drain(..) {
            let _ = task.await;
        }
    }
}
