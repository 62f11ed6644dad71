// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bootstrap configuration from the job-contract environment.
//!
//! The agent front-end hands the bootstrap its configuration as
//! `BUILDKITE_*` environment variables; hooks may change a small mutable
//! subset mid-job, which [`BootstrapConfig::read_from_environment`]
//! folds back in.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use rig_core::{Environment, Job};
use rig_process::DEFAULT_SECRET_VAR_PATTERNS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVariable(&'static str),
}

/// Everything the sequencer needs to run one job.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Immutable job inputs.
    pub job: Job,

    pub agent_name: String,
    pub organization_slug: String,
    pub pipeline_slug: String,

    /// Root under which per-pipeline checkout directories are created.
    pub build_path: PathBuf,
    /// Directory holding the agent's global hooks.
    pub hooks_path: PathBuf,
    /// Cache directory for materialized plugins.
    pub plugins_path: PathBuf,
    /// Optional directory prepended to PATH for child processes.
    pub bin_path: Option<PathBuf>,

    pub git_clone_flags: String,
    pub git_clean_flags: String,

    /// Run the command phase under a pseudo-terminal.
    pub run_in_pty: bool,
    /// Leave symlinked files out of artifact uploads.
    pub upload_skip_symlinks: bool,
    /// Grace between a graceful interrupt and a hard termination.
    pub cancel_grace: Duration,
    /// Variable-name patterns whose values are redacted from the log.
    pub redacted_vars: Vec<String>,
}

impl BootstrapConfig {
    /// Read the configuration from a job-contract environment.
    pub fn from_environment(env: &Environment) -> Result<Self, ConfigError> {
        let job = Job {
            id: require(env, "BUILDKITE_JOB_ID")?,
            command: env.value("BUILDKITE_COMMAND").to_string(),
            repository: env.value("BUILDKITE_REPO").to_string(),
            branch: env.value("BUILDKITE_BRANCH").to_string(),
            commit: default_if_empty(env.value("BUILDKITE_COMMIT"), "HEAD"),
            pull_request: match env.value("BUILDKITE_PULL_REQUEST") {
                "" => None,
                pr => Some(pr.to_string()),
            },
            refspec: env.value("BUILDKITE_REFSPEC").to_string(),
            pipeline_provider: env.value("BUILDKITE_PIPELINE_PROVIDER").to_string(),
            plugins_json: env.value("BUILDKITE_PLUGINS").to_string(),
            artifact_paths: env.value("BUILDKITE_ARTIFACT_PATHS").to_string(),
            artifact_destination: env
                .value("BUILDKITE_ARTIFACT_UPLOAD_DESTINATION")
                .to_string(),
            command_eval: bool_var(env, "BUILDKITE_COMMAND_EVAL", true),
            verify_ssh_fingerprints: bool_var(env, "BUILDKITE_SSH_FINGERPRINT_VERIFICATION", true),
            include_submodules: bool_var(env, "BUILDKITE_GIT_SUBMODULES", true),
            clean_checkout: bool_var(env, "BUILDKITE_CLEAN_CHECKOUT", false),
        };

        Ok(Self {
            job,
            agent_name: default_if_empty(env.value("BUILDKITE_AGENT_NAME"), "rigger"),
            organization_slug: env.value("BUILDKITE_ORGANIZATION_SLUG").to_string(),
            pipeline_slug: env.value("BUILDKITE_PIPELINE_SLUG").to_string(),
            build_path: PathBuf::from(require(env, "BUILDKITE_BUILD_PATH")?),
            hooks_path: PathBuf::from(env.value("BUILDKITE_HOOKS_PATH")),
            plugins_path: PathBuf::from(env.value("BUILDKITE_PLUGINS_PATH")),
            bin_path: match env.value("BUILDKITE_BIN_PATH") {
                "" => None,
                path => Some(PathBuf::from(path)),
            },
            git_clone_flags: default_if_empty(env.value("BUILDKITE_GIT_CLONE_FLAGS"), "-v"),
            git_clean_flags: default_if_empty(env.value("BUILDKITE_GIT_CLEAN_FLAGS"), "-fxdq"),
            run_in_pty: bool_var(env, "BUILDKITE_PTY", true),
            upload_skip_symlinks: bool_var(env, "BUILDKITE_UPLOAD_SKIP_SYMLINKS", false),
            cancel_grace: Duration::from_secs(
                env.value("BUILDKITE_CANCEL_GRACE_PERIOD")
                    .parse()
                    .unwrap_or(10),
            ),
            redacted_vars: match env.value("BUILDKITE_REDACTED_VARS") {
                "" => DEFAULT_SECRET_VAR_PATTERNS
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                list => list.split(',').map(|s| s.trim().to_string()).collect(),
            },
        })
    }

    /// Fold a hook's environment changes back into the mutable subset of
    /// the configuration. Returns the names of the variables that changed
    /// the configuration.
    pub fn read_from_environment(&mut self, diff: &Environment) -> Vec<String> {
        let mut changed = Vec::new();

        let mut fold = |key: &'static str, slot: &mut String| {
            if let Some(value) = diff.get(key) {
                if slot != value {
                    *slot = value.to_string();
                    changed.push(key.to_string());
                }
            }
        };

        fold("BUILDKITE_ARTIFACT_PATHS", &mut self.job.artifact_paths);
        fold(
            "BUILDKITE_ARTIFACT_UPLOAD_DESTINATION",
            &mut self.job.artifact_destination,
        );
        fold("BUILDKITE_GIT_CLEAN_FLAGS", &mut self.git_clean_flags);
        fold("BUILDKITE_GIT_CLONE_FLAGS", &mut self.git_clone_flags);
        fold("BUILDKITE_REFSPEC", &mut self.job.refspec);

        changed
    }

    /// The checkout directory for this job:
    /// `<build_path>/<sanitized agent name>/<org>/<pipeline>`.
    pub fn checkout_path(&self) -> PathBuf {
        self.build_path
            .join(sanitize_dir_name(&self.agent_name))
            .join(&self.organization_slug)
            .join(&self.pipeline_slug)
    }
}

fn require(env: &Environment, key: &'static str) -> Result<String, ConfigError> {
    match env.value(key) {
        "" => Err(ConfigError::MissingVariable(key)),
        value => Ok(value.to_string()),
    }
}

fn default_if_empty(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

fn bool_var(env: &Environment, key: &str, default: bool) -> bool {
    match env.value(key) {
        "" => default,
        "true" | "1" => true,
        "false" | "0" => false,
        other => {
            tracing::warn!(key, value = other, "unparseable boolean, using default");
            default
        }
    }
}

/// Agent names may contain anything; directory names may not.
fn sanitize_dir_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
