// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact model and content-type mapping

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Fallback content type for unknown file extensions.
pub const FALLBACK_CONTENT_TYPE: &str = "binary/octet-stream";

/// Terminal upload state of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactState {
    Pending,
    Finished,
    Error,
}

impl ArtifactState {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactState::Pending => "pending",
            ArtifactState::Finished => "finished",
            ArtifactState::Error => "error",
        }
    }
}

impl fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file produced by the job, selected by glob, hashed and uploaded.
///
/// Built once after hashing; the id and URL are filled in by registration
/// with the control plane; the state is set exactly once per upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Path reported to the control plane, relative to the working
    /// directory (or the filesystem root for absolute glob patterns).
    pub path: String,
    /// Resolved absolute path on disk.
    pub absolute_path: PathBuf,
    /// The glob pattern (or directory prospect) that selected this file.
    pub glob_path: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Lowercase hex SHA-1 of the contents.
    pub sha1sum: String,
    /// Lowercase hex SHA-256 of the contents.
    pub sha256sum: String,
    /// Content type, by extension.
    pub content_type: String,
    /// Identifier assigned at registration.
    pub id: Option<String>,
    /// Destination URL reported back to the control plane.
    pub url: Option<String>,
    /// Upload state.
    pub state: ArtifactState,
}

/// Content type for a file, chosen by extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "log" | "md" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "wasm" => "application/wasm",
        _ => FALLBACK_CONTENT_TYPE,
    }
}

#[cfg(test)]
#[path = "artifact_tests.rs"]
mod tests;
