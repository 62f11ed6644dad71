// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::pipeline::OutputPipeline;
use crate::redact::Redactor;
use rig_api::RecordingControlPlane;

#[tokio::test]
async fn uploads_lines_in_order_and_flushes_at_close() {
    let pipeline = OutputPipeline::new(Redactor::none());
    let rx = pipeline.subscribe("log", 64);
    let api = Arc::new(RecordingControlPlane::new());

    pipeline.write(b"first\nsecond\n");
    pipeline.close();

    stream_logs(rx, api.clone(), "job-1", false).await;
    assert_eq!(api.log(), "first\nsecond\n");
}

#[tokio::test(start_paused = true)]
async fn final_chunk_survives_a_transient_failure() {
    let pipeline = OutputPipeline::new(Redactor::none());
    let rx = pipeline.subscribe("log", 64);
    let api = Arc::new(RecordingControlPlane::new());
    api.fail_next("append_log", 1);

    pipeline.write(b"a\nb\n");
    pipeline.close();

    stream_logs(rx, api.clone(), "job-1", false).await;
    assert_eq!(api.log(), "a\nb\n");
}

#[tokio::test]
async fn large_buffers_flush_early() {
    let pipeline = OutputPipeline::new(Redactor::none());
    let rx = pipeline.subscribe("log", 4096);
    let api = Arc::new(RecordingControlPlane::new());

    let long_line = "x".repeat(1024);
    for _ in 0..70 {
        pipeline.write_line(&long_line);
    }
    pipeline.close();

    stream_logs(rx, api.clone(), "job-1", false).await;

    let calls = api.calls();
    // More than one append: the 64 KiB threshold split the stream.
    assert!(calls.len() > 1, "expected chunked uploads, got {}", calls.len());
    assert_eq!(api.log().lines().count(), 70);
}
