// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane payload types

use std::collections::BTreeMap;
use std::path::Path;

use rig_core::Artifact;
use serde::{Deserialize, Serialize};

/// Header timestamps keyed by header index, RFC 3339 nanosecond UTC.
pub type HeaderTimes = BTreeMap<usize, String>;

/// An artifact as registered with the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDraft {
    pub path: String,
    pub absolute_path: String,
    pub glob_path: String,
    pub file_size: u64,
    pub sha1sum: String,
    pub sha256sum: String,
    pub content_type: String,
    /// Destination URL when a storage back-end supplies one up front.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ArtifactDraft {
    pub fn from_artifact(artifact: &Artifact) -> Self {
        Self {
            path: artifact.path.clone(),
            absolute_path: path_string(&artifact.absolute_path),
            glob_path: artifact.glob_path.clone(),
            file_size: artifact.file_size,
            sha1sum: artifact.sha1sum.clone(),
            sha256sum: artifact.sha256sum.clone(),
            content_type: artifact.content_type.clone(),
            url: artifact.url.clone(),
        }
    }
}

/// Registration response entry: the id (and any upload instructions) the
/// control plane assigned to one draft, in request order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedArtifact {
    pub id: String,
    pub path: String,
    /// Pre-signed or form-action URL for the default uploader.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
