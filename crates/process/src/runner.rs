// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child process execution.
//!
//! Spawns one child per invocation, streams its combined output through
//! an [`OutputPipeline`], and exposes started/done signals plus group
//! signalling for cancellation. Optionally runs the child under a
//! pseudo-terminal so build tools emit colour and progress output.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;

use rig_core::Environment;

use crate::lookpath::find_executable;
use crate::pipeline::OutputPipeline;

/// How long to wait for output copy tasks after the child exits. Some
/// container runtimes never deliver PTY EOF; the runner proceeds anyway.
pub const CONSUMER_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Grace between SIGTERM and SIGKILL in [`ProcessHandle::terminate`].
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Errors from spawning or signalling a child.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("empty command")]
    EmptyCommand,
    #[error("executable not found: {0}")]
    ExecutableNotFound(String),
    #[error("process already started")]
    AlreadyStarted,
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("pty error: {0}")]
    Pty(String),
    #[error("failed to signal process group: {0}")]
    Signal(String),
}

/// What to run and how.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Program and arguments. The program is resolved against the
    /// effective PATH unless absolute.
    pub command: Vec<String>,
    /// Child environment; `None` inherits the agent's.
    pub env: Option<Environment>,
    /// Working directory; `None` inherits.
    pub dir: Option<PathBuf>,
    /// Allocate a pseudo-terminal for the child.
    pub pty: bool,
}

impl RunConfig {
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

struct HandleState {
    pid: Option<u32>,
    pgid: Option<i32>,
}

struct HandleInner {
    state: Mutex<HandleState>,
    started_tx: watch::Sender<bool>,
    started_rx: watch::Receiver<bool>,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

/// Observable state of a running (or finished) child process.
///
/// The started signal transitions exactly once, as does the done signal;
/// done is set strictly before [`Runner::run`] returns the exit code.
#[derive(Clone)]
pub struct ProcessHandle {
    inner: Arc<HandleInner>,
}

impl ProcessHandle {
    fn new() -> Self {
        let (started_tx, started_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        Self {
            inner: Arc::new(HandleInner {
                state: Mutex::new(HandleState {
                    pid: None,
                    pgid: None,
                }),
                started_tx,
                started_rx,
                done_tx,
                done_rx,
            }),
        }
    }

    /// Child pid, once started.
    pub fn pid(&self) -> Option<u32> {
        self.inner.state.lock().pid
    }

    /// Whether the child has exited.
    pub fn is_done(&self) -> bool {
        *self.inner.done_rx.borrow()
    }

    /// Wait until the child has been spawned.
    pub async fn wait_started(&self) {
        let mut rx = self.inner.started_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Wait until the child has exited.
    pub async fn wait_done(&self) {
        let mut rx = self.inner.done_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Graceful stop: SIGINT to the child's process group. Falls back to
    /// [`terminate`](Self::terminate) when the signal cannot be sent.
    pub fn interrupt(&self) -> Result<(), RunnerError> {
        let Some(pgid) = self.inner.state.lock().pgid else {
            tracing::debug!("no process to interrupt yet");
            return Ok(());
        };

        if let Err(e) = signal_group(pgid, GroupSignal::Interrupt) {
            tracing::error!(pgid, error = %e, "failed to interrupt process group, terminating");
            return self.terminate();
        }
        Ok(())
    }

    /// Hard stop: SIGTERM to the group, then SIGKILL after a short grace
    /// period if the child is still running.
    pub fn terminate(&self) -> Result<(), RunnerError> {
        let Some(pgid) = self.inner.state.lock().pgid else {
            tracing::debug!("no process to terminate yet");
            return Ok(());
        };

        signal_group(pgid, GroupSignal::Terminate).map_err(RunnerError::Signal)?;

        let handle = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(TERMINATE_GRACE).await;
            if !handle.is_done() {
                tracing::warn!(pgid, "child survived SIGTERM grace period, sending SIGKILL");
                let _ = signal_group(pgid, GroupSignal::Kill);
            }
        });
        Ok(())
    }

    fn mark_started(&self, pid: Option<u32>) {
        {
            let mut state = self.inner.state.lock();
            state.pid = pid;
            state.pgid = pid.map(|p| p as i32);
        }
        let _ = self.inner.started_tx.send(true);
    }

    fn mark_done(&self) {
        let _ = self.inner.done_tx.send(true);
    }
}

enum GroupSignal {
    Interrupt,
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(pgid: i32, signal: GroupSignal) -> Result<(), String> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let sig = match signal {
        GroupSignal::Interrupt => Signal::SIGINT,
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    killpg(Pid::from_raw(pgid), sig).map_err(|e| e.to_string())
}

#[cfg(not(unix))]
fn signal_group(_pgid: i32, _signal: GroupSignal) -> Result<(), String> {
    Err("process group signalling is not supported on this platform".to_string())
}

/// Runs one child process to completion.
pub struct Runner {
    handle: ProcessHandle,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self {
            handle: ProcessHandle::new(),
        }
    }

    /// Handle for observing and signalling the child.
    pub fn handle(&self) -> ProcessHandle {
        self.handle.clone()
    }

    /// Spawn the child and block until it exits, streaming combined
    /// output into `pipeline`. Returns the exit code: the wait status
    /// code, 128+signal for signal deaths, or -1 for unclassifiable
    /// outcomes (logged with their cause).
    pub async fn run(
        &self,
        config: RunConfig,
        pipeline: Arc<OutputPipeline>,
    ) -> Result<i32, RunnerError> {
        if *self.handle.inner.started_rx.borrow() {
            return Err(RunnerError::AlreadyStarted);
        }

        let program = config.command.first().ok_or(RunnerError::EmptyCommand)?;
        let exe = resolve_program(program, config.env.as_ref())?;

        let code = if config.pty {
            self.run_pty(&exe, &config, &pipeline).await?
        } else {
            self.run_piped(&exe, &config, &pipeline).await?
        };

        // Done must be observable before the caller sees the exit code.
        self.handle.mark_done();
        Ok(code)
    }

    async fn run_piped(
        &self,
        exe: &PathBuf,
        config: &RunConfig,
        pipeline: &Arc<OutputPipeline>,
    ) -> Result<i32, RunnerError> {
        let mut cmd = tokio::process::Command::new(exe);
        cmd.args(&config.command[1..]);
        if let Some(env) = &config.env {
            cmd.env_clear();
            for (key, value) in env.iter() {
                cmd.env(key, value);
            }
        }
        if let Some(dir) = &config.dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // The child leads its own process group so signals reach the
        // whole tree. A PTY establishes a session by itself; this branch
        // has no PTY so we reparent explicitly.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setpgid(nix::unistd::Pid::from_raw(0), nix::unistd::Pid::from_raw(0))
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
            });
        }

        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            command: exe.display().to_string(),
            source,
        })?;

        self.handle.mark_started(child.id());
        tracing::info!(pid = ?child.id(), command = %exe.display(), "process is running");

        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(copy_to_pipeline(out, Arc::clone(pipeline))));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(copy_to_pipeline(err, Arc::clone(pipeline))));

        let code = match child.wait().await {
            Ok(status) => exit_code_from_status(status),
            Err(e) => {
                tracing::error!(error = %e, "unexpected error waiting for child");
                -1
            }
        };

        drain_tasks(vec![stdout_task, stderr_task]).await;

        tracing::info!(pid = ?self.handle.pid(), code, "process finished");
        Ok(code)
    }

    async fn run_pty(
        &self,
        exe: &PathBuf,
        config: &RunConfig,
        pipeline: &Arc<OutputPipeline>,
    ) -> Result<i32, RunnerError> {
        use portable_pty::{native_pty_system, CommandBuilder, PtySize};

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| RunnerError::Pty(e.to_string()))?;

        let mut builder = CommandBuilder::new(exe);
        for arg in &config.command[1..] {
            builder.arg(arg);
        }
        if let Some(env) = &config.env {
            builder.env_clear();
            for (key, value) in env.iter() {
                builder.env(key, value);
            }
        }
        if let Some(dir) = &config.dir {
            builder.cwd(dir);
        }

        let mut child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| RunnerError::Pty(e.to_string()))?;
        // Close our copy of the slave so master EOF tracks the child.
        drop(pair.slave);

        self.handle.mark_started(child.process_id());
        tracing::info!(pid = ?child.process_id(), command = %exe.display(), "process is running under a pty");

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| RunnerError::Pty(e.to_string()))?;

        let reader_pipeline = Arc::clone(pipeline);
        let reader_task = tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; 8192];
            loop {
                match std::io::Read::read(&mut reader, &mut buf) {
                    Ok(0) => break,
                    Ok(n) => reader_pipeline.write(&buf[..n]),
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    // EIO from the master is the PTY reporting that the
                    // other side closed; treat it as a clean EOF.
                    #[cfg(unix)]
                    Err(e) if e.raw_os_error() == Some(nix::errno::Errno::EIO as i32) => break,
                    Err(e) => {
                        tracing::debug!(error = %e, "pty read ended");
                        break;
                    }
                }
            }
        });

        let wait_task = tokio::task::spawn_blocking(move || child.wait());
        let code = match wait_task.await {
            Ok(Ok(status)) => status.exit_code() as i32,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "unexpected error waiting for pty child");
                -1
            }
            Err(e) => {
                tracing::error!(error = %e, "pty wait task panicked");
                -1
            }
        };

        if tokio::time::timeout(CONSUMER_DRAIN_TIMEOUT, reader_task)
            .await
            .is_err()
        {
            tracing::debug!("timed out waiting for pty output to drain");
        }
        drop(pair.master);

        tracing::info!(pid = ?self.handle.pid(), code, "process finished");
        Ok(code)
    }
}

fn resolve_program(program: &str, env: Option<&Environment>) -> Result<PathBuf, RunnerError> {
    let (path_var, pathext) = match env {
        Some(env) => (
            env.value("PATH").to_string(),
            env.value("PATHEXT").to_string(),
        ),
        None => (
            std::env::var("PATH").unwrap_or_default(),
            std::env::var("PATHEXT").unwrap_or_default(),
        ),
    };

    find_executable(program, &path_var, &pathext)
        .ok_or_else(|| RunnerError::ExecutableNotFound(program.to_string()))
}

async fn copy_to_pipeline(mut reader: impl AsyncReadExt + Unpin, pipeline: Arc<OutputPipeline>) {
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => pipeline.write(&buf[..n]),
            Err(e) => {
                tracing::debug!(error = %e, "output copy ended");
                break;
            }
        }
    }
}

async fn drain_tasks(tasks: Vec<Option<tokio::task::JoinHandle<()>>>) {
    let drain = async {
        for task in tasks.into_iter().flatten() {
            let _ = task.await;
        }
    };
    if tokio::time::timeout(CONSUMER_DRAIN_TIMEOUT, drain).await.is_err() {
        tracing::debug!("timed out waiting for output copy tasks to drain");
    }
}

fn exit_code_from_status(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    tracing::error!(?status, "unclassifiable wait status");
    -1
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
