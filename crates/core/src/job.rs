// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Immutable job inputs dispatched by the control plane

use serde::{Deserialize, Serialize};

/// One unit of work dispatched by the control plane.
///
/// A job is constructed once from the dispatch payload (or, in the
/// bootstrap subprocess, from the job-contract environment variables) and
/// never mutated afterwards. Mutable execution state lives in the job
/// environment and the bootstrap configuration instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Job identifier assigned by the control plane.
    pub id: String,
    /// Command text to run (may be multi-line).
    pub command: String,
    /// Repository URL to check out.
    pub repository: String,
    /// Branch the build was triggered on.
    pub branch: String,
    /// Commit to check out. The literal `HEAD` means "tip of the branch".
    pub commit: String,
    /// Pull request number, when the build came from one.
    pub pull_request: Option<String>,
    /// Custom refspec overriding the checkout strategy.
    pub refspec: String,
    /// Source-control provider slug (e.g. `github`).
    pub pipeline_provider: String,
    /// Plugin references as a JSON document (array of strings or
    /// `{location: configuration}` objects).
    pub plugins_json: String,
    /// Semicolon-delimited artifact glob patterns.
    pub artifact_paths: String,
    /// Artifact upload destination (empty means the control plane).
    pub artifact_destination: String,

    /// Whether the agent may evaluate command strings (as opposed to only
    /// running scripts that exist inside the checkout).
    pub command_eval: bool,
    /// Whether to verify SSH host fingerprints before cloning.
    pub verify_ssh_fingerprints: bool,
    /// Whether to initialize and update git submodules.
    pub include_submodules: bool,
    /// Whether to remove the checkout directory before checking out.
    pub clean_checkout: bool,
}

impl Job {
    /// Whether the build came from a pull request.
    pub fn is_pull_request(&self) -> bool {
        matches!(&self.pull_request, Some(pr) if !pr.is_empty() && pr != "false")
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
