// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The shell context phases run in: job environment, working directory,
//! and child execution wired into the job's output pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use rig_core::Environment;
use rig_process::{OutputPipeline, ProcessHandle, RunConfig, Runner, RunnerError};

/// Timeout for short capture commands (`ssh -G`, `git rev-parse`, ...).
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error("{command} exited with status {code}")]
    CommandFailed { command: String, code: i32 },
    #[error("{command} timed out after {timeout:?}")]
    CaptureTimeout { command: String, timeout: Duration },
    #[error("failed to change directory to {path}: {source}")]
    Chdir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to run {command}: {source}")]
    Capture {
        command: String,
        source: std::io::Error,
    },
}

/// Execution context shared by every phase of one job.
///
/// The environment is mutated only between phases (hook diffs applied by
/// the sequencer); children see a stable snapshot taken at spawn.
pub struct JobShell {
    /// The job environment.
    pub env: Environment,
    cwd: PathBuf,
    pipeline: Arc<OutputPipeline>,
    /// Handle of the currently running child, for cancellation.
    active: Arc<Mutex<Option<ProcessHandle>>>,
}

impl JobShell {
    pub fn new(env: Environment, cwd: impl Into<PathBuf>, pipeline: Arc<OutputPipeline>) -> Self {
        Self {
            env,
            cwd: cwd.into(),
            pipeline,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// The pipeline job output flows through.
    pub fn pipeline(&self) -> Arc<OutputPipeline> {
        Arc::clone(&self.pipeline)
    }

    /// Shared slot holding the active child's handle.
    pub fn active_handle(&self) -> Arc<Mutex<Option<ProcessHandle>>> {
        Arc::clone(&self.active)
    }

    pub fn getwd(&self) -> &Path {
        &self.cwd
    }

    pub fn chdir(&mut self, path: impl Into<PathBuf>) -> Result<(), ShellError> {
        let path = path.into();
        std::fs::metadata(&path).map_err(|source| ShellError::Chdir {
            path: path.clone(),
            source,
        })?;
        self.cwd = path;
        Ok(())
    }

    /// Emit a section header into the job log (timestamped by the
    /// header-time streamer).
    pub fn header(&self, message: &str) {
        self.pipeline.write_line(&format!("--- {}", message));
    }

    /// Emit an expanded section header (shown unfolded in the UI).
    pub fn header_expanded(&self, message: &str) {
        self.pipeline.write_line(&format!("+++ {}", message));
    }

    /// Emit a comment line into the job log.
    pub fn comment(&self, message: &str) {
        self.pipeline.write_line(&format!("# {}", message));
    }

    /// Emit the prompt marker the generated build script mimics.
    pub fn prompt(&self, display: &str) {
        self.pipeline.write_line(&format!("$ {}", display));
    }

    /// Run `argv` with the job environment, streaming output into the
    /// pipeline. Returns the exit code.
    pub async fn run<S: AsRef<str>>(&self, argv: &[S]) -> Result<i32, ShellError> {
        self.spawn(argv, &self.env, self.cwd.clone(), false).await
    }

    /// Like [`run`](Self::run) but a non-zero exit is an error.
    pub async fn run_checked<S: AsRef<str>>(&self, argv: &[S]) -> Result<(), ShellError> {
        let code = self.run(argv).await?;
        if code != 0 {
            return Err(ShellError::CommandFailed {
                command: display_argv(argv),
                code,
            });
        }
        Ok(())
    }

    /// Run a script file (hook wrapper or build script) with an explicit
    /// environment, optionally under a PTY.
    ///
    /// On POSIX the script runs as `/bin/bash -c "<path>"` so files
    /// without a shebang (and paths with spaces) still execute.
    pub async fn run_script(
        &self,
        path: &Path,
        env: &Environment,
        pty: bool,
    ) -> Result<i32, ShellError> {
        let argv = script_argv(path);
        self.spawn(&argv, env, self.cwd.clone(), pty).await
    }

    async fn spawn<S: AsRef<str>>(
        &self,
        argv: &[S],
        env: &Environment,
        dir: PathBuf,
        pty: bool,
    ) -> Result<i32, ShellError> {
        let mut config = RunConfig::new(argv.iter().map(|s| s.as_ref().to_string()));
        config.env = Some(env.clone());
        config.dir = Some(dir);
        config.pty = pty;

        let runner = Runner::new();
        *self.active.lock() = Some(runner.handle());
        let result = runner.run(config, Arc::clone(&self.pipeline)).await;
        *self.active.lock() = None;

        Ok(result?)
    }

    /// Run `argv` and capture trimmed stdout, bypassing the pipeline.
    /// Non-zero exits are errors carrying stderr.
    pub async fn run_and_capture<S: AsRef<str>>(&self, argv: &[S]) -> Result<String, ShellError> {
        let display = display_argv(argv);
        let mut cmd = tokio::process::Command::new(argv[0].as_ref());
        for arg in &argv[1..] {
            cmd.arg(arg.as_ref());
        }
        cmd.env_clear();
        for (key, value) in self.env.iter() {
            cmd.env(key, value);
        }
        cmd.current_dir(&self.cwd);
        cmd.stdin(std::process::Stdio::null());

        let output = tokio::time::timeout(CAPTURE_TIMEOUT, cmd.output())
            .await
            .map_err(|_| ShellError::CaptureTimeout {
                command: display.clone(),
                timeout: CAPTURE_TIMEOUT,
            })?
            .map_err(|source| ShellError::Capture {
                command: display.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ShellError::CommandFailed {
                command: display,
                code: output.status.code().unwrap_or(-1),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(not(windows))]
fn script_argv(path: &Path) -> Vec<String> {
    vec![
        "/bin/bash".to_string(),
        "-c".to_string(),
        format!("\"{}\"", path.display()),
    ]
}

#[cfg(windows)]
fn script_argv(path: &Path) -> Vec<String> {
    vec![path.display().to_string()]
}

fn display_argv<S: AsRef<str>>(argv: &[S]) -> String {
    argv.iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[path = "shell_tests.rs"]
mod tests;
