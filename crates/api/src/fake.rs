// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recording control plane for testing

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::client::{ApiError, ControlPlane};
use crate::types::{ArtifactDraft, CreatedArtifact, HeaderTimes};

/// Recorded control-plane call
#[derive(Debug, Clone)]
pub enum ApiCall {
    AppendLog {
        job_id: String,
        chunk: String,
    },
    SaveHeaderTimes {
        job_id: String,
        times: HeaderTimes,
    },
    CreateArtifacts {
        job_id: String,
        drafts: Vec<ArtifactDraft>,
    },
    UpdateArtifactStates {
        job_id: String,
        states: BTreeMap<String, String>,
    },
    UploadArtifact {
        job_id: String,
        artifact_id: String,
        size: usize,
    },
    MetadataExists {
        job_id: String,
        key: String,
    },
    SetMetadata {
        job_id: String,
        key: String,
        value: String,
    },
}

#[derive(Default)]
struct RecordingState {
    calls: Vec<ApiCall>,
    metadata: HashSet<String>,
    /// Remaining scripted failures per method name.
    failures: HashMap<&'static str, usize>,
    uploaded_bodies: HashMap<String, Vec<u8>>,
}

/// In-memory [`ControlPlane`] that records every call and can be scripted
/// to fail the next N invocations of a method.
#[derive(Clone, Default)]
pub struct RecordingControlPlane {
    inner: Arc<Mutex<RecordingState>>,
    next_artifact_id: Arc<AtomicU64>,
}

impl RecordingControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.inner.lock().calls.clone()
    }

    /// Script the next `count` invocations of `method` to fail with a
    /// transport error. Method names match the trait method identifiers.
    pub fn fail_next(&self, method: &'static str, count: usize) {
        self.inner.lock().failures.insert(method, count);
    }

    /// Pre-populate a metadata key, as if another agent had set it.
    pub fn insert_metadata(&self, key: &str) {
        self.inner.lock().metadata.insert(key.to_string());
    }

    /// Concatenation of all appended log chunks.
    pub fn log(&self) -> String {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                ApiCall::AppendLog { chunk, .. } => Some(chunk.as_str()),
                _ => None,
            })
            .collect()
    }

    /// All header-times payloads, in upload order.
    pub fn header_times(&self) -> Vec<HeaderTimes> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                ApiCall::SaveHeaderTimes { times, .. } => Some(times.clone()),
                _ => None,
            })
            .collect()
    }

    /// Final state per artifact id, folded over all state updates.
    pub fn artifact_states(&self) -> BTreeMap<String, String> {
        let mut folded = BTreeMap::new();
        for call in self.inner.lock().calls.iter() {
            if let ApiCall::UpdateArtifactStates { states, .. } = call {
                folded.extend(states.clone());
            }
        }
        folded
    }

    /// Number of registered artifacts across all create calls.
    pub fn created_artifact_count(&self) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .map(|c| match c {
                ApiCall::CreateArtifacts { drafts, .. } => drafts.len(),
                _ => 0,
            })
            .sum()
    }

    /// Body uploaded through the form uploader for an artifact id.
    pub fn uploaded_body(&self, artifact_id: &str) -> Option<Vec<u8>> {
        self.inner.lock().uploaded_bodies.get(artifact_id).cloned()
    }

    fn check_failure(&self, method: &'static str) -> Result<(), ApiError> {
        let mut state = self.inner.lock();
        match state.failures.get_mut(method) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(ApiError::Transport(format!("scripted failure: {}", method)))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ControlPlane for RecordingControlPlane {
    async fn append_log(&self, job_id: &str, chunk: &str) -> Result<(), ApiError> {
        self.check_failure("append_log")?;
        self.inner.lock().calls.push(ApiCall::AppendLog {
            job_id: job_id.to_string(),
            chunk: chunk.to_string(),
        });
        Ok(())
    }

    async fn save_header_times(&self, job_id: &str, times: &HeaderTimes) -> Result<(), ApiError> {
        self.check_failure("save_header_times")?;
        self.inner.lock().calls.push(ApiCall::SaveHeaderTimes {
            job_id: job_id.to_string(),
            times: times.clone(),
        });
        Ok(())
    }

    async fn create_artifacts(
        &self,
        job_id: &str,
        drafts: &[ArtifactDraft],
    ) -> Result<Vec<CreatedArtifact>, ApiError> {
        self.check_failure("create_artifacts")?;
        let created = drafts
            .iter()
            .map(|draft| CreatedArtifact {
                id: format!(
                    "artifact-{}",
                    self.next_artifact_id.fetch_add(1, Ordering::SeqCst)
                ),
                path: draft.path.clone(),
                upload_url: None,
            })
            .collect();
        self.inner.lock().calls.push(ApiCall::CreateArtifacts {
            job_id: job_id.to_string(),
            drafts: drafts.to_vec(),
        });
        Ok(created)
    }

    async fn update_artifact_states(
        &self,
        job_id: &str,
        states: &BTreeMap<String, String>,
    ) -> Result<(), ApiError> {
        self.check_failure("update_artifact_states")?;
        self.inner.lock().calls.push(ApiCall::UpdateArtifactStates {
            job_id: job_id.to_string(),
            states: states.clone(),
        });
        Ok(())
    }

    async fn upload_artifact(
        &self,
        job_id: &str,
        artifact_id: &str,
        body: Vec<u8>,
    ) -> Result<(), ApiError> {
        self.check_failure("upload_artifact")?;
        let mut state = self.inner.lock();
        state.calls.push(ApiCall::UploadArtifact {
            job_id: job_id.to_string(),
            artifact_id: artifact_id.to_string(),
            size: body.len(),
        });
        state.uploaded_bodies.insert(artifact_id.to_string(), body);
        Ok(())
    }

    async fn metadata_exists(&self, job_id: &str, key: &str) -> Result<bool, ApiError> {
        self.check_failure("metadata_exists")?;
        let mut state = self.inner.lock();
        state.calls.push(ApiCall::MetadataExists {
            job_id: job_id.to_string(),
            key: key.to_string(),
        });
        Ok(state.metadata.contains(key))
    }

    async fn set_metadata(&self, job_id: &str, key: &str, value: &str) -> Result<(), ApiError> {
        self.check_failure("set_metadata")?;
        let mut state = self.inner.lock();
        state.metadata.insert(key.to_string());
        state.calls.push(ApiCall::SetMetadata {
            job_id: job_id.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
