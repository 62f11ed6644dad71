// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook execution: wrapper scripts and environment diff capture.
//!
//! A hook is sourced by a short generated wrapper so the changes it makes
//! to its environment are visible; the wrapper then dumps `env` to a file
//! the executor parses and diffs against the pre-hook environment. The
//! wrapper's exit code is the hook's.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use thiserror::Error;

use rig_core::Environment;

use crate::shell::{JobShell, ShellError};

/// Shell bookkeeping variables that always differ across a subshell and
/// never belong in a hook's environment diff.
const IGNORED_DIFF_KEYS: &[&str] = &["_", "OLDPWD", "PWD", "SHLVL", "BASH_EXECUTION_STRING"];

#[derive(Debug, Error)]
pub enum HookError {
    #[error(transparent)]
    Shell(#[from] ShellError),
    #[error("failed to prepare hook wrapper: {0}")]
    Wrapper(std::io::Error),
    #[error("the {label} hook removed its environment dump")]
    MissingEnvDump { label: String },
}

/// Result of one hook invocation.
#[derive(Debug)]
pub struct HookOutcome {
    pub exit_code: i32,
    /// Variables the hook added or changed. Empty when the hook failed
    /// (a failed hook's environment is not trusted).
    pub diff: Environment,
}

/// Run the hook at `path`, if present.
///
/// `extra_env` (plugin configuration) is layered over the job environment
/// for the duration of the hook and for the diff baseline. Returns
/// `None` when no script exists at `path`.
pub async fn run_hook(
    shell: &JobShell,
    label: &str,
    path: &Path,
    extra_env: Option<&Environment>,
) -> Result<Option<HookOutcome>, HookError> {
    if !path.exists() {
        tracing::debug!(label, path = %path.display(), "no hook script, skipping");
        return Ok(None);
    }

    shell.header(&format!("Running {} hook", label));

    let pre_env = match extra_env {
        Some(extra) => shell.env.merge(extra),
        None => shell.env.clone(),
    };

    // Scoped tempfiles: both are removed on every exit path when the
    // guards drop.
    let dump = tempfile::Builder::new()
        .prefix("rigger-env-")
        .tempfile()
        .map_err(HookError::Wrapper)?;
    let wrapper = write_wrapper(path, dump.path()).map_err(HookError::Wrapper)?;

    tracing::debug!(label, wrapper = %wrapper.path().display(), "executing hook wrapper");
    eprintln!("DEBUG wrapper path={:?} contents={:?}", wrapper.path(), std::fs::read_to_string(wrapper.path()));
    eprintln!("DEBUG wrapper perms={:?}", std::fs::metadata(wrapper.path()).map(|m| m.permissions()));
    std::fs::copy(wrapper.path(), "/tmp/debug_wrapper.sh").ok();
    std::fs::set_permissions("/tmp/debug_wrapper.sh", std::fs::Permissions::from_mode(0o700)).ok();
    eprintln!("DEBUG hook path exists={} meta={:?}", path.exists(), std::fs::metadata(path));
    eprintln!("DEBUG hook contents={:?}", std::fs::read_to_string(path));
    eprintln!("DEBUG pre_env={:?}", pre_env.iter().collect::<Vec<_>>());
    eprintln!("DEBUG cwd={:?}", shell.getwd());
    let exit_code = shell.run_script(wrapper.path(), &pre_env, false).await?;
    eprintln!("DEBUG exit_code={}", exit_code);

    if exit_code != 0 {
        return Ok(Some(HookOutcome {
            exit_code,
            diff: Environment::new(),
        }));
    }

    let post_env = Environment::from_file(dump.path()).map_err(|e| {
        tracing::error!(label, error = %e, "hook environment dump unreadable");
        HookError::MissingEnvDump {
            label: label.to_string(),
        }
    })?;

    let mut diff = post_env.diff(&pre_env);
    for key in IGNORED_DIFF_KEYS {
        diff.remove(key);
    }

    Ok(Some(HookOutcome { exit_code, diff }))
}

/// Write the wrapper script that sources the hook and dumps the
/// resulting environment, preserving the hook's exit code.
fn write_wrapper(
    hook_path: &Path,
    dump_path: &Path,
) -> std::io::Result<tempfile::NamedTempFile> {
    let mut wrapper = tempfile::Builder::new()
        .prefix("rigger-hook-")
        .suffix(wrapper_suffix())
        .tempfile()?;

    wrapper
        .as_file_mut()
        .write_all(wrapper_body(hook_path, dump_path).as_bytes())?;
    wrapper.as_file_mut().flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(wrapper.path(), std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(wrapper)
}

#[cfg(not(windows))]
fn wrapper_suffix() -> &'static str {
    ".sh"
}

#[cfg(windows)]
fn wrapper_suffix() -> &'static str {
    ".bat"
}

#[cfg(not(windows))]
fn wrapper_body(hook_path: &Path, dump_path: &Path) -> String {
    format!(
        "#!/bin/bash\n\
         . \"{hook}\"\n\
         __rigger_exit=$?\n\
         env > \"{dump}\"\n\
         exit $__rigger_exit\n",
        hook = hook_path.display(),
        dump = dump_path.display(),
    )
}

#[cfg(windows)]
fn wrapper_body(hook_path: &Path, dump_path: &Path) -> String {
    format!(
        "@echo off\r\n\
         CALL \"{hook}\"\r\n\
         SET __RIGGER_EXIT=%ERRORLEVEL%\r\n\
         SET > \"{dump}\"\r\n\
         EXIT /B %__RIGGER_EXIT%\r\n",
        hook = hook_path.display(),
        dump = dump_path.display(),
    )
}

#[cfg(test)]
#[path = "hook_tests.rs"]
mod tests;
