// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rig_api::RecordingControlPlane;
use rig_core::ArtifactState;

fn artifact(path: &str, absolute: &std::path::Path, id: Option<&str>) -> Artifact {
    Artifact {
        path: path.to_string(),
        absolute_path: absolute.to_path_buf(),
        glob_path: "*".to_string(),
        file_size: 0,
        sha1sum: String::new(),
        sha256sum: String::new(),
        content_type: "text/plain".to_string(),
        id: id.map(String::from),
        url: None,
        state: ArtifactState::Pending,
    }
}

#[test]
fn classifies_destinations() {
    assert_eq!(
        DestinationKind::parse("").unwrap(),
        DestinationKind::ControlPlane
    );
    assert_eq!(
        DestinationKind::parse("s3://bucket/prefix").unwrap(),
        DestinationKind::S3
    );
    assert_eq!(
        DestinationKind::parse("gs://bucket/prefix").unwrap(),
        DestinationKind::GoogleCloud
    );
    assert_eq!(
        DestinationKind::parse("rt://repo/path").unwrap(),
        DestinationKind::Artifactory
    );
    assert_eq!(
        DestinationKind::parse("https://acct.blob.core.windows.net/container/x").unwrap(),
        DestinationKind::AzureBlob
    );
}

#[test]
fn rejects_unknown_destinations() {
    assert!(matches!(
        DestinationKind::parse("ftp://old-school"),
        Err(StoreError::InvalidDestination(_))
    ));
    assert!(matches!(
        DestinationKind::parse("https://example.com/not-azure"),
        Err(StoreError::InvalidDestination(_))
    ));
}

#[test]
fn cloud_backends_resolve_to_external_plugin_errors() {
    let api = std::sync::Arc::new(RecordingControlPlane::new());
    let err = store_for_destination("s3://bucket", api, "job-1").unwrap_err();
    assert!(matches!(err, StoreError::ExternalBackend("s3")));
}

#[tokio::test]
async fn form_store_uploads_file_bodies() {
    let dir = tempfile::TempDir::new().unwrap();
    let file = dir.path().join("app.log");
    std::fs::write(&file, b"contents").unwrap();

    let api = std::sync::Arc::new(RecordingControlPlane::new());
    let store = FormStore::new(api.clone(), "job-1");

    let a = artifact("app.log", &file, Some("artifact-0"));
    assert_eq!(store.url_for(&a), None);
    store.upload(&a).await.unwrap();

    assert_eq!(api.uploaded_body("artifact-0").unwrap(), b"contents");
}

#[tokio::test]
async fn form_store_requires_registration() {
    let dir = tempfile::TempDir::new().unwrap();
    let file = dir.path().join("app.log");
    std::fs::write(&file, b"x").unwrap();

    let api = std::sync::Arc::new(RecordingControlPlane::new());
    let store = FormStore::new(api, "job-1");

    let a = artifact("app.log", &file, None);
    assert!(matches!(
        store.upload(&a).await,
        Err(StoreError::Unregistered { .. })
    ));
}
