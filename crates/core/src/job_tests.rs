// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn pull_request_indicator() {
    let mut job = Job::default();
    assert!(!job.is_pull_request());

    job.pull_request = Some("false".to_string());
    assert!(!job.is_pull_request());

    job.pull_request = Some("".to_string());
    assert!(!job.is_pull_request());

    job.pull_request = Some("123".to_string());
    assert!(job.is_pull_request());
}

#[test]
fn serializes_round_trip() {
    let job = Job {
        id: "job-1".to_string(),
        command: "make test".to_string(),
        repository: "git@github.com:acme/widgets.git".to_string(),
        branch: "main".to_string(),
        commit: "abc123".to_string(),
        command_eval: true,
        ..Job::default()
    };
    let json = serde_json::to_string(&job).unwrap();
    let back: Job = serde_json::from_str(&json).unwrap();
    assert_eq!(back, job);
}
