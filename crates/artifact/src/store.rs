// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage back-end dispatch.
//!
//! The uploader picks a back-end from the destination prefix. Cloud
//! back-ends (S3, GCS, Artifactory, Azure Blob) are external plugins
//! built on the same two-method contract; the default control-plane form
//! upload ships in-tree.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

use rig_api::{ApiError, ControlPlane};
use rig_core::Artifact;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(
        "invalid upload destination {0:?}: only s3://*, gs://*, rt://*, \
         https://*.blob.core.windows.net/* or an empty destination are allowed"
    )]
    InvalidDestination(String),
    #[error("the {0} back-end is provided by an external uploader plugin")]
    ExternalBackend(&'static str),
    #[error("artifact {path} has no registered id")]
    Unregistered { path: String },
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// A storage back-end: names a destination URL for each artifact and
/// performs the transfer.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Destination URL reported to the control plane, or `None` when the
    /// control plane assigns one itself.
    fn url_for(&self, artifact: &Artifact) -> Option<String>;

    /// Transfer one artifact.
    async fn upload(&self, artifact: &Artifact) -> Result<(), StoreError>;
}

impl std::fmt::Debug for dyn ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn ArtifactStore").finish_non_exhaustive()
    }
}

/// Destination classification by URL prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationKind {
    /// Empty destination: the control plane's own storage.
    ControlPlane,
    S3,
    GoogleCloud,
    Artifactory,
    AzureBlob,
}

fn azure_blob_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https://[^/]+\.blob\.core\.windows\.net/").unwrap())
}

impl DestinationKind {
    /// Classify a destination string.
    pub fn parse(destination: &str) -> Result<Self, StoreError> {
        let destination = destination.trim();
        if destination.is_empty() {
            return Ok(Self::ControlPlane);
        }
        if destination.starts_with("s3://") {
            return Ok(Self::S3);
        }
        if destination.starts_with("gs://") {
            return Ok(Self::GoogleCloud);
        }
        if destination.starts_with("rt://") {
            return Ok(Self::Artifactory);
        }
        if azure_blob_re().is_match(destination) {
            return Ok(Self::AzureBlob);
        }
        Err(StoreError::InvalidDestination(destination.to_string()))
    }
}

/// Build the in-tree store for a destination.
///
/// Cloud destinations classify successfully but resolve to an error here:
/// their uploaders are external collaborators linked by the full agent
/// build. The error names the back-end so operators know what is missing.
pub fn store_for_destination(
    destination: &str,
    api: Arc<dyn ControlPlane>,
    job_id: &str,
) -> Result<Arc<dyn ArtifactStore>, StoreError> {
    match DestinationKind::parse(destination)? {
        DestinationKind::ControlPlane => Ok(Arc::new(FormStore::new(api, job_id))),
        DestinationKind::S3 => Err(StoreError::ExternalBackend("s3")),
        DestinationKind::GoogleCloud => Err(StoreError::ExternalBackend("gs")),
        DestinationKind::Artifactory => Err(StoreError::ExternalBackend("artifactory")),
        DestinationKind::AzureBlob => Err(StoreError::ExternalBackend("azure-blob")),
    }
}

/// Default uploader: POST artifact bodies back to the control plane.
pub struct FormStore {
    api: Arc<dyn ControlPlane>,
    job_id: String,
}

impl FormStore {
    pub fn new(api: Arc<dyn ControlPlane>, job_id: &str) -> Self {
        Self {
            api,
            job_id: job_id.to_string(),
        }
    }
}

#[async_trait]
impl ArtifactStore for FormStore {
    fn url_for(&self, _artifact: &Artifact) -> Option<String> {
        // The control plane assigns storage URLs at registration.
        None
    }

    async fn upload(&self, artifact: &Artifact) -> Result<(), StoreError> {
        let id = artifact.id.as_deref().ok_or_else(|| StoreError::Unregistered {
            path: artifact.path.clone(),
        })?;

        let body =
            tokio::fs::read(&artifact.absolute_path)
                .await
                .map_err(|source| StoreError::Read {
                    path: artifact.absolute_path.display().to_string(),
                    source,
                })?;

        self.api.upload_artifact(&self.job_id, id, body).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
