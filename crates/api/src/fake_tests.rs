// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn records_calls_in_order() {
    let api = RecordingControlPlane::new();
    api.append_log("job-1", "hello\n").await.unwrap();
    api.set_metadata("job-1", "k", "v").await.unwrap();

    let calls = api.calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(&calls[0], ApiCall::AppendLog { chunk, .. } if chunk == "hello\n"));
    assert!(matches!(&calls[1], ApiCall::SetMetadata { key, .. } if key == "k"));
}

#[tokio::test]
async fn scripted_failures_decrement() {
    let api = RecordingControlPlane::new();
    api.fail_next("append_log", 2);

    assert!(api.append_log("j", "a").await.is_err());
    assert!(api.append_log("j", "b").await.is_err());
    assert!(api.append_log("j", "c").await.is_ok());
    assert_eq!(api.log(), "c");
}

#[tokio::test]
async fn create_artifacts_assigns_sequential_ids() {
    let api = RecordingControlPlane::new();
    let draft = ArtifactDraft {
        path: "out/app.log".to_string(),
        absolute_path: "/build/out/app.log".to_string(),
        glob_path: "out/**".to_string(),
        file_size: 3,
        sha1sum: "a".to_string(),
        sha256sum: "b".to_string(),
        content_type: "text/plain".to_string(),
        url: None,
    };

    let created = api
        .create_artifacts("job-1", &[draft.clone(), draft])
        .await
        .unwrap();
    assert_eq!(created.len(), 2);
    assert_ne!(created[0].id, created[1].id);
}

#[tokio::test]
async fn metadata_exists_after_set() {
    let api = RecordingControlPlane::new();
    assert!(!api.metadata_exists("j", "build:commit").await.unwrap());
    api.set_metadata("j", "build:commit", "abc").await.unwrap();
    assert!(api.metadata_exists("j", "build:commit").await.unwrap());
}

#[tokio::test]
async fn artifact_states_fold_over_updates() {
    let api = RecordingControlPlane::new();
    let mut first = BTreeMap::new();
    first.insert("a-1".to_string(), "finished".to_string());
    api.update_artifact_states("j", &first).await.unwrap();

    let mut second = BTreeMap::new();
    second.insert("a-2".to_string(), "error".to_string());
    api.update_artifact_states("j", &second).await.unwrap();

    let states = api.artifact_states();
    assert_eq!(states.get("a-1").map(String::as_str), Some("finished"));
    assert_eq!(states.get("a-2").map(String::as_str), Some("error"));
}
