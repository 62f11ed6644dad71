// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The default checkout: clone or update the repository and land on the
//! job's commit, by whichever fetch strategy the job calls for.

use std::sync::Arc;

use thiserror::Error;

use rig_api::ControlPlane;

use crate::config::BootstrapConfig;
use crate::git::{add_host_to_known_hosts, enumerate_submodule_urls, git_clean, split_flags};
use crate::shell::{JobShell, ShellError};

/// Metadata key guarding the once-per-build commit upload.
const COMMIT_METADATA_KEY: &str = "buildkite:git:commit";
const BRANCH_METADATA_KEY: &str = "buildkite:git:branch";

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("no repository configured for this job")]
    MissingRepository,
    #[error(transparent)]
    Shell(#[from] ShellError),
}

/// Run the default checkout phase body in the current working directory
/// (the job's checkout path).
pub async fn default_checkout(
    shell: &JobShell,
    config: &BootstrapConfig,
    api: &Arc<dyn ControlPlane>,
) -> Result<(), CheckoutError> {
    let job = &config.job;
    if job.repository.is_empty() {
        return Err(CheckoutError::MissingRepository);
    }

    if job.verify_ssh_fingerprints {
        add_host_to_known_hosts(shell, &job.repository).await;
    }

    // Update the remote on an existing clone so repository renames are
    // handled gracefully; otherwise clone fresh.
    if shell.getwd().join(".git").exists() {
        shell
            .run_checked(&["git", "remote", "set-url", "origin", job.repository.as_str()])
            .await?;
    } else {
        let mut argv: Vec<String> = vec!["git".into(), "clone".into()];
        argv.extend(split_flags(&config.git_clone_flags));
        argv.push("--".into());
        argv.push(job.repository.clone());
        argv.push(".".into());
        shell.run_checked(&argv).await?;
    }

    git_clean(shell, &config.git_clean_flags, job.include_submodules).await?;

    if !job.refspec.is_empty() {
        // A custom refspec wins over everything else.
        shell.comment("Fetch and checkout custom refspec");
        let mut argv: Vec<String> = vec![
            "git".into(),
            "fetch".into(),
            "-v".into(),
            "--prune".into(),
            "origin".into(),
        ];
        argv.extend(split_flags(&job.refspec));
        shell.run_checked(&argv).await?;
        shell
            .run_checked(&["git", "checkout", "-f", job.commit.as_str()])
            .await?;
    } else if job.is_pull_request() && job.pipeline_provider.contains("github") {
        // GitHub exposes pull request heads under a special ref, whether
        // or not the commit is reachable from a branch.
        shell.comment("Fetch and checkout pull request head");
        let pr_ref = format!(
            "refs/pull/{}/head",
            job.pull_request.as_deref().unwrap_or_default()
        );
        shell
            .run_checked(&["git", "fetch", "-v", "origin", pr_ref.as_str()])
            .await?;

        if let Ok(fetch_head) = shell.run_and_capture(&["git", "rev-parse", "FETCH_HEAD"]).await {
            shell.comment(&format!("FETCH_HEAD is now `{}`", fetch_head));
        }

        shell
            .run_checked(&["git", "checkout", "-f", job.commit.as_str()])
            .await?;
    } else if job.commit == "HEAD" {
        // No commit pin: take whatever the branch tip is right now.
        shell.comment("Fetch and checkout remote branch HEAD commit");
        shell
            .run_checked(&["git", "fetch", "-v", "--prune", "origin", job.branch.as_str()])
            .await?;
        shell
            .run_checked(&["git", "checkout", "-f", "FETCH_HEAD"])
            .await?;
    } else {
        // Fetch the commit directly. Some servers refuse that, so fall
        // back to the configured refspec plus all tags and hope the
        // commit is reachable.
        shell.comment("Fetch and checkout commit");
        let direct = shell
            .run(&["git", "fetch", "-v", "origin", job.commit.as_str()])
            .await?;
        if direct != 0 {
            let configured_refspec = shell
                .run_and_capture(&["git", "config", "remote.origin.fetch"])
                .await
                .unwrap_or_default();
            let mut argv: Vec<String> = vec![
                "git".into(),
                "fetch".into(),
                "-v".into(),
                "--prune".into(),
                "origin".into(),
            ];
            if !configured_refspec.is_empty() {
                argv.push(configured_refspec);
            }
            argv.push("+refs/tags/*:refs/tags/*".into());
            shell.run_checked(&argv).await?;
        }
        shell
            .run_checked(&["git", "checkout", "-f", job.commit.as_str()])
            .await?;
    }

    if job.include_submodules {
        update_submodules(shell, config).await?;
    }

    git_clean(shell, &config.git_clean_flags, job.include_submodules).await?;

    send_commit_metadata(shell, config, api).await;

    Ok(())
}

async fn update_submodules(shell: &JobShell, config: &BootstrapConfig) -> Result<(), CheckoutError> {
    if config.job.verify_ssh_fingerprints {
        shell.comment("Checking submodule urls against known_hosts");
        for repository in enumerate_submodule_urls(shell).await {
            add_host_to_known_hosts(shell, &repository).await;
        }
    }

    // `submodule sync` needs git >= 1.8.1; warn rather than fail on
    // ancient installations.
    if let Err(e) = shell
        .run_checked(&["git", "submodule", "sync", "--recursive"])
        .await
    {
        let version = shell
            .run_and_capture(&["git", "--version"])
            .await
            .unwrap_or_default();
        tracing::warn!(
            error = %e,
            git = %version,
            "failed to sync git submodules; git 1.8.1+ is required"
        );
    }

    shell
        .run_checked(&[
            "git",
            "submodule",
            "update",
            "--init",
            "--recursive",
            "--force",
        ])
        .await?;
    shell
        .run_checked(&[
            "git",
            "submodule",
            "foreach",
            "--recursive",
            "git",
            "reset",
            "--hard",
        ])
        .await?;

    Ok(())
}

/// Send commit and branch details to the control plane, once per build:
/// if the metadata key does not exist yet, this agent uploads it.
async fn send_commit_metadata(
    shell: &JobShell,
    config: &BootstrapConfig,
    api: &Arc<dyn ControlPlane>,
) {
    shell.comment("Checking to see if git data needs to be sent");
    let exists = match api.metadata_exists(&config.job.id, COMMIT_METADATA_KEY).await {
        Ok(exists) => exists,
        Err(e) => {
            tracing::warn!(error = %e, "could not check commit metadata, skipping upload");
            return;
        }
    };
    if exists {
        return;
    }

    shell.comment("Sending git commit information back");
    let commit = shell
        .run_and_capture(&["git", "show", "HEAD", "-s", "--format=fuller", "--no-color"])
        .await
        .unwrap_or_default();
    let branch = shell
        .run_and_capture(&["git", "branch", "--contains", "HEAD", "--no-color"])
        .await
        .unwrap_or_default();

    if let Err(e) = api
        .set_metadata(&config.job.id, COMMIT_METADATA_KEY, &commit)
        .await
    {
        tracing::warn!(error = %e, "failed to upload commit metadata");
        return;
    }
    if let Err(e) = api
        .set_metadata(&config.job.id, BRANCH_METADATA_KEY, &branch)
        .await
    {
        tracing::warn!(error = %e, "failed to upload branch metadata");
    }
}

#[cfg(test)]
#[path = "checkout_tests.rs"]
mod tests;
