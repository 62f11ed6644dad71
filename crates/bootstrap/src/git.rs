// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git URL handling, host-key management and repository cleaning.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::lock::lock_file_with_timeout;
use crate::shell::JobShell;

/// Lock timeout for known_hosts edits.
const KNOWN_HOSTS_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum GitUrlError {
    #[error("empty repository url")]
    Empty,
}

/// A repository URL normalized to `scheme://[user@]host/path` form.
///
/// scp-like syntax (`git@host:path`) and bare filesystem paths are
/// rewritten so the host can be extracted uniformly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitUrl {
    pub scheme: String,
    pub user: Option<String>,
    /// Host, including a `:port` suffix when one was given.
    pub host: String,
    pub path: String,
}

impl GitUrl {
    /// The host without any port suffix, and the port if present.
    pub fn host_and_port(&self) -> (&str, Option<&str>) {
        match self.host.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => (host, Some(port)),
            _ => (self.host.as_str(), None),
        }
    }
}

impl fmt::Display for GitUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        write!(f, "{}{}", self.host, self.path)
    }
}

/// Parse anything git accepts as a remote into a [`GitUrl`].
pub fn parse_gittable_url(raw: &str) -> Result<GitUrl, GitUrlError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(GitUrlError::Empty);
    }

    // Already scheme-qualified.
    if let Some((scheme, rest)) = raw.split_once("://") {
        let (user, rest) = match rest.split_once('@') {
            Some((user, tail)) if !user.contains('/') => (Some(user.to_string()), tail),
            _ => (None, rest),
        };
        let (host, path) = match rest.find('/') {
            Some(idx) => (rest[..idx].to_string(), rest[idx..].to_string()),
            None => (rest.to_string(), String::new()),
        };
        return Ok(GitUrl {
            scheme: scheme.to_string(),
            user,
            host,
            path,
        });
    }

    // scp-like: [user@]host:path (the colon comes before any slash).
    if let Some((head, tail)) = raw.split_once(':') {
        if !head.contains('/') && !tail.is_empty() {
            let (user, host) = match head.split_once('@') {
                Some((user, host)) => (Some(user.to_string()), host.to_string()),
                None => (None, head.to_string()),
            };
            return Ok(GitUrl {
                scheme: "ssh".to_string(),
                user,
                host,
                path: format!("/{}", tail),
            });
        }
    }

    // A local filesystem path.
    Ok(GitUrl {
        scheme: "file".to_string(),
        user: None,
        host: String::new(),
        path: raw.to_string(),
    })
}

/// Resolve an SSH host alias to its canonical `hostname[:port]` using
/// `ssh -G`. Falls back to the alias when `ssh -G` is unavailable (old
/// OpenSSH) or unparseable.
pub async fn resolve_git_host(shell: &JobShell, alias: &str) -> String {
    let output = match shell.run_and_capture(&["ssh", "-G", alias]).await {
        Ok(output) => output,
        Err(e) => {
            tracing::debug!(alias, error = %e, "ssh -G failed, using host as-is");
            return alias.to_string();
        }
    };

    let mut hostname = None;
    let mut port = None;
    for line in output.lines() {
        if let Some(value) = line.strip_prefix("hostname ") {
            hostname = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("port ") {
            port = Some(value.trim().to_string());
        }
    }

    match (hostname, port) {
        (Some(host), Some(port)) if port != "22" => format!("{}:{}", host, port),
        (Some(host), _) => host,
        (None, _) => alias.to_string(),
    }
}

/// Add a repository's SSH host key to the agent's known_hosts file.
///
/// Best-effort: failures are logged, never fatal — a missing host key
/// surfaces later as a clearer git error.
pub async fn add_host_to_known_hosts(shell: &JobShell, repository: &str) {
    let url = match parse_gittable_url(repository) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(repository, error = %e, "cannot parse repository url");
            return;
        }
    };

    // Local clones have no host key to learn.
    if url.host.is_empty() || url.scheme == "file" {
        return;
    }

    let Some(known_hosts) = known_hosts_path(shell) else {
        tracing::warn!("no home directory, skipping known_hosts update");
        return;
    };
    if let Some(parent) = known_hosts.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(error = %e, "failed to create .ssh directory");
            return;
        }
    }

    let lock_path = known_hosts.with_extension("lock");
    let _lock = match lock_file_with_timeout(&lock_path, KNOWN_HOSTS_LOCK_TIMEOUT).await {
        Ok(lock) => lock,
        Err(e) => {
            tracing::warn!(error = %e, "failed to lock known_hosts");
            return;
        }
    };

    let (alias, url_port) = url.host_and_port();
    let resolved = resolve_git_host(shell, alias).await;
    let (host, resolved_port) = match resolved.rsplit_once(':') {
        Some((h, p)) if p.chars().all(|c| c.is_ascii_digit()) => {
            (h.to_string(), Some(p.to_string()))
        }
        _ => (resolved.clone(), url_port.map(String::from)),
    };

    // Skip when the host is already trusted.
    if let Ok(existing) = std::fs::read_to_string(&known_hosts) {
        if existing.lines().any(|l| l.contains(&host)) {
            tracing::debug!(host, "host already present in known_hosts");
            return;
        }
    }

    let mut argv: Vec<String> = vec!["ssh-keyscan".to_string()];
    if let Some(port) = &resolved_port {
        argv.push("-p".to_string());
        argv.push(port.clone());
    }
    argv.push(host.clone());

    let keys = match shell.run_and_capture(&argv).await {
        Ok(keys) if !keys.is_empty() => keys,
        Ok(_) => {
            tracing::warn!(host, "ssh-keyscan returned no keys");
            return;
        }
        Err(e) => {
            tracing::warn!(host, error = %e, "ssh-keyscan failed");
            return;
        }
    };

    let entry = format!("{}\n", keys.trim_end());
    let append = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&known_hosts)
        .and_then(|mut f| std::io::Write::write_all(&mut f, entry.as_bytes()));
    match append {
        Ok(()) => tracing::info!(host, "added host key to known_hosts"),
        Err(e) => tracing::warn!(host, error = %e, "failed to append known_hosts"),
    }
}

fn known_hosts_path(shell: &JobShell) -> Option<PathBuf> {
    let home = shell
        .env
        .get("HOME")
        .map(String::from)
        .or_else(|| std::env::var("HOME").ok())?;
    Some(PathBuf::from(home).join(".ssh").join("known_hosts"))
}

/// `git clean` the checkout (and submodules when enabled) with the
/// configured flags.
pub async fn git_clean(
    shell: &JobShell,
    clean_flags: &str,
    submodules: bool,
) -> Result<(), crate::shell::ShellError> {
    let mut argv = vec!["git".to_string(), "clean".to_string()];
    argv.extend(split_flags(clean_flags));
    shell.run_checked(&argv).await?;

    if submodules {
        let mut argv = vec![
            "git".to_string(),
            "submodule".to_string(),
            "foreach".to_string(),
            "--recursive".to_string(),
            "git".to_string(),
            "clean".to_string(),
        ];
        argv.extend(split_flags(clean_flags));
        shell.run_checked(&argv).await?;
    }

    Ok(())
}

/// Repository URLs configured for submodules in the current checkout.
pub async fn enumerate_submodule_urls(shell: &JobShell) -> Vec<String> {
    let output = match shell
        .run_and_capture(&[
            "git",
            "config",
            "--file",
            ".gitmodules",
            "--get-regexp",
            r"submodule\..+\.url",
        ])
        .await
    {
        Ok(output) => output,
        Err(_) => return Vec::new(),
    };

    output
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(String::from)
        .collect()
}

/// Split a whitespace-delimited flag string (`"-v --prune"`) into argv
/// entries.
pub fn split_flags(flags: &str) -> Vec<String> {
    flags.split_whitespace().map(String::from).collect()
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
