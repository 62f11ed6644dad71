// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin materialization: cloning referenced repositories into the
//! shared plugin cache under a per-plugin lock.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use rig_core::{hook_path, HookName, Plugin, PluginError};

use crate::git::add_host_to_known_hosts;
use crate::lock::{lock_file_with_timeout, LockError};
use crate::shell::{JobShell, ShellError};

/// How long to wait for another agent materializing the same plugin.
const PLUGIN_LOCK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum PluginPhaseError {
    #[error("cannot check out plugins without a plugins path")]
    MissingPluginsPath,
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Shell(#[from] ShellError),
    #[error("failed to create plugin directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Clone (or confirm presence of) one plugin in the cache.
///
/// Idempotent: a cache directory that already contains `.git` is reused
/// without touching the network. Concurrent materializations of the same
/// plugin are serialized by a lock file beside the cache directory (not
/// inside it, so the clone target stays empty).
pub async fn materialize(
    shell: &JobShell,
    plugin: &Plugin,
    plugins_path: &Path,
    verify_ssh_fingerprints: bool,
) -> Result<PathBuf, PluginPhaseError> {
    let directory = plugins_path.join(plugin.identifier());
    let git_directory = directory.join(".git");

    if git_directory.exists() {
        shell.comment(&format!("Plugin \"{}\" found", plugin.label()));
        return Ok(directory);
    }

    std::fs::create_dir_all(&directory).map_err(|source| PluginPhaseError::CreateDir {
        path: directory.clone(),
        source,
    })?;

    let lock_path = plugins_path.join(format!("{}.lock", plugin.identifier()));
    let _lock = lock_file_with_timeout(&lock_path, PLUGIN_LOCK_TIMEOUT).await?;

    // Another agent may have finished the clone while we waited.
    if git_directory.exists() {
        shell.comment(&format!("Plugin \"{}\" found", plugin.label()));
        return Ok(directory);
    }

    let repository = plugin.repository()?;
    shell.comment(&format!(
        "Plugin \"{}\" will be checked out to \"{}\"",
        plugin.label(),
        directory.display()
    ));

    if verify_ssh_fingerprints && !Path::new(&repository).exists() {
        add_host_to_known_hosts(shell, &repository).await;
    }

    // Plugin clones never use the job's custom clone flags.
    let clone = clone_shell(shell, &directory);
    clone
        .run_checked(&["git", "clone", "-v", "--", repository.as_str(), "."])
        .await?;

    if let Some(version) = &plugin.version {
        shell.comment(&format!("Checking out `{}`", version));
        clone
            .run_checked(&["git", "checkout", "-f", version.as_str()])
            .await?;
    }

    Ok(directory)
}

/// Absolute path of a plugin's hook, accounting for plugins that live in
/// a subdirectory of their repository.
pub fn plugin_hook_path(
    plugin: &Plugin,
    plugins_path: &Path,
    name: HookName,
) -> Result<PathBuf, PluginError> {
    let mut dir = plugins_path.join(plugin.identifier());
    let subdirectory = plugin.repository_subdirectory()?;
    if !subdirectory.is_empty() {
        dir = dir.join(subdirectory);
    }
    Ok(hook_path(&dir.join("hooks"), name))
}

/// A shell clone rooted in the plugin's cache directory, sharing the
/// job's pipeline and environment.
fn clone_shell(shell: &JobShell, directory: &Path) -> JobShell {
    JobShell::new(shell.env.clone(), directory, shell.pipeline())
}

#[cfg(test)]
#[path = "plugins_tests.rs"]
mod tests;
