// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The default command phase: run a repository script, or generate a
//! build script from the command text when evaluation is permitted.

use std::path::{Path, PathBuf};

use thiserror::Error;

use rig_core::script_file_name;

use crate::config::BootstrapConfig;
use crate::shell::{JobShell, ShellError};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("no command has been defined for this job")]
    NoCommand,
    #[error(
        "this agent is not allowed to evaluate console commands; \
         specify a script within your repository to run instead"
    )]
    EvalNotAllowed,
    #[error("this agent is only allowed to run scripts within the repository checkout")]
    OutsideCheckout,
    #[error("failed to write build script {path}: {source}")]
    WriteScript {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Shell(#[from] ShellError),
}

/// Run the job's command, returning its exit code.
pub async fn default_command(
    shell: &JobShell,
    config: &BootstrapConfig,
) -> Result<i32, CommandError> {
    let job = &config.job;
    if job.command.is_empty() {
        return Err(CommandError::NoCommand);
    }

    // A single-line command naming an existing file is run as a script.
    let script_name = job.command.replace('\n', "");
    let script_path = absolutize(shell.getwd(), Path::new(&script_name));
    let command_is_script = script_path.is_file();

    if !command_is_script && !job.command_eval {
        shell.comment(&format!("No such file: \"{}\"", script_name));
        return Err(CommandError::EvalNotAllowed);
    }

    if command_is_script
        && !job.command_eval
        && !script_path.starts_with(shell.getwd())
    {
        shell.comment(&format!("No such file: \"{}\"", script_name));
        return Err(CommandError::OutsideCheckout);
    }

    let (header, prompt_display, build_script_path) = if command_is_script {
        (
            "Running build script",
            format!("./\"{}\"", job.command),
            script_path,
        )
    } else {
        let path = shell
            .getwd()
            .join(script_file_name(&format!("rigger-script-{}", job.id)));
        write_build_script(&path, &job.command)?;
        ("Running command", job.command.clone(), path)
    };

    shell.header_expanded(header);
    shell.prompt(&prompt_display);

    let exit_code = shell
        .run_script(&build_script_path, &shell.env, config.run_in_pty)
        .await?;
    Ok(exit_code)
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Write the generated build script: echo each command line with a faint
/// prompt marker, then run it, stopping at the first failure.
fn write_build_script(path: &Path, command: &str) -> Result<(), CommandError> {
    let contents = build_script_contents(command);
    std::fs::write(path, contents).map_err(|source| CommandError::WriteScript {
        path: path.to_path_buf(),
        source,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(
            |source| CommandError::WriteScript {
                path: path.to_path_buf(),
                source,
            },
        )?;
    }

    Ok(())
}

#[cfg(not(windows))]
fn build_script_contents(command: &str) -> String {
    let mut contents = String::from("#!/bin/bash\nset -e\n");
    for line in command.lines().filter(|l| !l.is_empty()) {
        let escaped = line.replace('\'', "'\\''");
        contents.push_str(&format!("echo '\x1b[90m$\x1b[0m {}'\n", escaped));
        contents.push_str(line);
        contents.push('\n');
    }
    contents
}

#[cfg(windows)]
fn build_script_contents(command: &str) -> String {
    let mut contents = String::from("@echo off\r\n");
    for line in command.lines().filter(|l| !l.is_empty()) {
        contents.push_str(&format!("ECHO {}\r\n", line));
        contents.push_str(line);
        contents.push_str("\r\nif %errorlevel% neq 0 exit /b %errorlevel%\r\n");
    }
    contents
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
