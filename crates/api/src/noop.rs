// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! No-op control plane for standalone runs

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::client::{ApiError, ControlPlane};
use crate::types::{ArtifactDraft, CreatedArtifact, HeaderTimes};

/// A [`ControlPlane`] that acknowledges everything and stores nothing.
///
/// Used when the bootstrap runs without an agent front-end (local
/// debugging); the job log still reaches stdout through the log
/// streamer's echo.
#[derive(Default)]
pub struct NoopControlPlane {
    next_artifact_id: AtomicU64,
}

impl NoopControlPlane {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ControlPlane for NoopControlPlane {
    async fn append_log(&self, _job_id: &str, _chunk: &str) -> Result<(), ApiError> {
        Ok(())
    }

    async fn save_header_times(&self, _job_id: &str, times: &HeaderTimes) -> Result<(), ApiError> {
        tracing::debug!(count = times.len(), "discarding header times");
        Ok(())
    }

    async fn create_artifacts(
        &self,
        _job_id: &str,
        drafts: &[ArtifactDraft],
    ) -> Result<Vec<CreatedArtifact>, ApiError> {
        Ok(drafts
            .iter()
            .map(|draft| CreatedArtifact {
                id: format!(
                    "local-{}",
                    self.next_artifact_id.fetch_add(1, Ordering::SeqCst)
                ),
                path: draft.path.clone(),
                upload_url: None,
            })
            .collect())
    }

    async fn update_artifact_states(
        &self,
        _job_id: &str,
        states: &BTreeMap<String, String>,
    ) -> Result<(), ApiError> {
        tracing::debug!(count = states.len(), "discarding artifact states");
        Ok(())
    }

    async fn upload_artifact(
        &self,
        _job_id: &str,
        artifact_id: &str,
        body: Vec<u8>,
    ) -> Result<(), ApiError> {
        tracing::debug!(artifact_id, size = body.len(), "discarding artifact body");
        Ok(())
    }

    async fn metadata_exists(&self, _job_id: &str, _key: &str) -> Result<bool, ApiError> {
        // Nothing is ever stored, so nothing ever exists; uploads are
        // attempted (and discarded) once per run.
        Ok(false)
    }

    async fn set_metadata(&self, _job_id: &str, _key: &str, _value: &str) -> Result<(), ApiError> {
        Ok(())
    }
}
