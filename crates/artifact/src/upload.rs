// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The upload pipeline: registration, bounded-concurrency transfers with
//! per-file retry, and batched state updates.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;

use rig_api::{ApiError, ArtifactDraft, ControlPlane};
use rig_core::{Artifact, ArtifactState};

use crate::store::{store_for_destination, ArtifactStore, StoreError};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to register artifacts: {0}")]
    Registration(#[from] ApiError),
    #[error("control plane registered {got} artifacts for {expected} drafts")]
    RegistrationMismatch { expected: usize, got: usize },
    #[error("{failures} artifact upload(s) exceeded the retry budget")]
    UploadsFailed { failures: usize },
    #[error("failed to sync artifact states to the control plane")]
    StateSyncFailed,
}

/// Tuning for the upload pipeline. The defaults match production; tests
/// shrink the delays.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub job_id: String,
    pub destination: String,
    /// Concurrent transfer cap.
    pub concurrency: usize,
    /// Attempts per artifact.
    pub upload_attempts: usize,
    /// Constant delay between per-artifact attempts.
    pub upload_retry_delay: Duration,
    /// Attempts per state-update batch.
    pub state_attempts: usize,
    /// Base of the exponential sub-second backoff between state-update
    /// attempts.
    pub state_backoff_base: Duration,
    /// Per-attempt timeout for the first few state-update attempts; later
    /// attempts fall back to the client's own timeout.
    pub state_request_timeout: Duration,
}

impl UploadConfig {
    pub fn new(job_id: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            destination: destination.into(),
            concurrency: 5,
            upload_attempts: 10,
            upload_retry_delay: Duration::from_secs(5),
            state_attempts: 10,
            state_backoff_base: Duration::from_millis(100),
            state_request_timeout: Duration::from_secs(5),
        }
    }
}

/// Drives a set of collected artifacts to their terminal states.
pub struct ArtifactUploader {
    api: Arc<dyn ControlPlane>,
    config: UploadConfig,
}

impl ArtifactUploader {
    pub fn new(api: Arc<dyn ControlPlane>, config: UploadConfig) -> Self {
        Self { api, config }
    }

    /// Register, transfer and state-sync `artifacts`.
    ///
    /// Every artifact is attempted regardless of earlier failures; the
    /// error (if any) is returned after the last state batch has been
    /// sent.
    pub async fn upload(&self, mut artifacts: Vec<Artifact>) -> Result<(), UploadError> {
        if artifacts.is_empty() {
            return Ok(());
        }

        let store = store_for_destination(
            &self.config.destination,
            Arc::clone(&self.api),
            &self.config.job_id,
        )?;

        for artifact in &mut artifacts {
            artifact.url = store.url_for(artifact);
        }

        // One registration batch per job.
        let drafts: Vec<ArtifactDraft> = artifacts.iter().map(ArtifactDraft::from_artifact).collect();
        let created = self
            .api
            .create_artifacts(&self.config.job_id, &drafts)
            .await?;
        if created.len() != artifacts.len() {
            return Err(UploadError::RegistrationMismatch {
                expected: artifacts.len(),
                got: created.len(),
            });
        }
        for (artifact, registered) in artifacts.iter_mut().zip(&created) {
            artifact.id = Some(registered.id.clone());
            if artifact.url.is_none() {
                artifact.url = registered.upload_url.clone();
            }
        }

        // Terminal states accumulate here; a dedicated task drains them
        // to the control plane once a second and once more at shutdown.
        let states: Arc<Mutex<BTreeMap<String, String>>> = Arc::new(Mutex::new(BTreeMap::new()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state_task = tokio::spawn(run_state_uploader(
            Arc::clone(&self.api),
            self.config.clone(),
            Arc::clone(&states),
            shutdown_rx,
        ));

        let failures = self.run_transfers(&artifacts, store, &states).await;

        let _ = shutdown_tx.send(true);
        let state_ok = state_task.await.unwrap_or(false);

        if failures > 0 {
            return Err(UploadError::UploadsFailed { failures });
        }
        if !state_ok {
            return Err(UploadError::StateSyncFailed);
        }
        Ok(())
    }

    /// Transfer every artifact through a bounded worker pool. Returns the
    /// number of artifacts that exhausted their retry budget.
    async fn run_transfers(
        &self,
        artifacts: &[Artifact],
        store: Arc<dyn ArtifactStore>,
        states: &Arc<Mutex<BTreeMap<String, String>>>,
    ) -> usize {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = tokio::task::JoinSet::new();

        for artifact in artifacts.iter().cloned() {
            let semaphore = Arc::clone(&semaphore);
            let store = Arc::clone(&store);
            let states = Arc::clone(states);
            let attempts = self.config.upload_attempts.max(1);
            let delay = self.config.upload_retry_delay;

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return 1usize;
                };

                tracing::info!(
                    path = %artifact.path,
                    size = artifact.file_size,
                    "uploading artifact"
                );

                let mut state = ArtifactState::Error;
                for attempt in 1..=attempts {
                    match store.upload(&artifact).await {
                        Ok(()) => {
                            state = ArtifactState::Finished;
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(
                                path = %artifact.path,
                                attempt,
                                attempts,
                                error = %e,
                                "artifact upload attempt failed"
                            );
                            if attempt < attempts {
                                tokio::time::sleep(delay).await;
                            }
                        }
                    }
                }

                if let Some(id) = &artifact.id {
                    states.lock().insert(id.clone(), state.as_str().to_string());
                }

                usize::from(state == ArtifactState::Error)
            });
        }

        let mut failures = 0;
        while let Some(result) = tasks.join_next().await {
            failures += result.unwrap_or(1);
        }
        failures
    }
}

/// Drain terminal states to the control plane: once a second while
/// transfers run, once more on shutdown. Returns whether every batch was
/// eventually delivered.
async fn run_state_uploader(
    api: Arc<dyn ControlPlane>,
    config: UploadConfig,
    states: Arc<Mutex<BTreeMap<String, String>>>,
    mut shutdown: watch::Receiver<bool>,
) -> bool {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    let mut ok = true;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                ok &= drain_states(api.as_ref(), &config, &states).await;
            }
            _ = shutdown.changed() => {
                ok &= drain_states(api.as_ref(), &config, &states).await;
                return ok;
            }
        }
    }
}

/// Take the pending states under lock, then upload outside it with a
/// bounded retry loop. The first few attempts carry a short per-attempt
/// timeout for fast feedback; later ones defer to the client.
async fn drain_states(
    api: &dyn ControlPlane,
    config: &UploadConfig,
    states: &Mutex<BTreeMap<String, String>>,
) -> bool {
    let batch = {
        let mut pending = states.lock();
        if pending.is_empty() {
            return true;
        }
        std::mem::take(&mut *pending)
    };

    let mut request_timeout = Some(config.state_request_timeout);
    for attempt in 1..=config.state_attempts.max(1) {
        if attempt > 1 {
            tokio::time::sleep(state_backoff(config.state_backoff_base, attempt)).await;
        }

        let request = api.update_artifact_states(&config.job_id, &batch);
        let result = match request_timeout {
            Some(t) => tokio::time::timeout(t, request)
                .await
                .unwrap_or(Err(ApiError::Timeout)),
            None => request.await,
        };

        match result {
            Ok(()) => {
                tracing::debug!(count = batch.len(), "uploaded artifact states");
                return true;
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "artifact state update failed");
                if attempt == 4 {
                    request_timeout = None;
                }
            }
        }
    }

    tracing::error!(count = batch.len(), "gave up uploading artifact states");
    false
}

/// Exponential backoff capped below one second.
fn state_backoff(base: Duration, attempt: usize) -> Duration {
    let exp = attempt.saturating_sub(2).min(4) as u32;
    let delay = base.saturating_mul(2u32.saturating_pow(exp));
    delay.min(Duration::from_millis(800))
}

#[cfg(test)]
#[path = "upload_tests.rs"]
mod tests;
