// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The control-plane trait

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ArtifactDraft, CreatedArtifact, HeaderTimes};

/// Errors surfaced by a control-plane client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("control plane transport error: {0}")]
    Transport(String),
    #[error("control plane rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("control plane request timed out")]
    Timeout,
}

/// The surface of the hosted control plane the core consumes.
///
/// Implementations own their transport, per-request timeouts and
/// authentication. Calls are idempotent where the core retries them
/// (artifact state updates, header times).
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Append a chunk of redacted job log output, in order.
    async fn append_log(&self, job_id: &str, chunk: &str) -> Result<(), ApiError>;

    /// Upload header timestamps keyed by header index.
    async fn save_header_times(&self, job_id: &str, times: &HeaderTimes) -> Result<(), ApiError>;

    /// Register artifacts in one batch; the response carries an entry per
    /// draft, in request order.
    async fn create_artifacts(
        &self,
        job_id: &str,
        drafts: &[ArtifactDraft],
    ) -> Result<Vec<CreatedArtifact>, ApiError>;

    /// Upload a batch of artifact state transitions.
    async fn update_artifact_states(
        &self,
        job_id: &str,
        states: &BTreeMap<String, String>,
    ) -> Result<(), ApiError>;

    /// Transfer an artifact body through the default (form) uploader.
    async fn upload_artifact(
        &self,
        job_id: &str,
        artifact_id: &str,
        body: Vec<u8>,
    ) -> Result<(), ApiError>;

    /// Whether a build metadata key already exists.
    async fn metadata_exists(&self, job_id: &str, key: &str) -> Result<bool, ApiError>;

    /// Set a build metadata key.
    async fn set_metadata(&self, job_id: &str, key: &str, value: &str) -> Result<(), ApiError>;
}
