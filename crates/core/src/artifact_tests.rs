// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn content_type_by_extension() {
    assert_eq!(content_type_for(Path::new("build.log")), "text/plain");
    assert_eq!(content_type_for(Path::new("report.JSON")), "application/json");
    assert_eq!(content_type_for(Path::new("shot.png")), "image/png");
}

#[test]
fn content_type_falls_back_for_unknown() {
    assert_eq!(content_type_for(Path::new("app.bin")), FALLBACK_CONTENT_TYPE);
    assert_eq!(content_type_for(Path::new("no-extension")), FALLBACK_CONTENT_TYPE);
}

#[test]
fn state_strings_match_wire_values() {
    assert_eq!(ArtifactState::Finished.as_str(), "finished");
    assert_eq!(ArtifactState::Error.as_str(), "error");
    assert_eq!(ArtifactState::Pending.to_string(), "pending");
}

#[test]
fn state_serializes_lowercase() {
    assert_eq!(
        serde_json::to_string(&ArtifactState::Finished).unwrap(),
        "\"finished\""
    );
}
