// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

async fn drain(mut rx: LineReceiver) -> Vec<String> {
    let mut out = Vec::new();
    while let Some(line) = rx.recv().await {
        out.push(line.text);
    }
    out
}

#[tokio::test]
async fn consumers_see_lines_in_source_order() {
    let pipeline = OutputPipeline::new(Redactor::none());
    let a = pipeline.subscribe("a", 16);
    let b = pipeline.subscribe("b", 16);

    pipeline.write(b"one\ntwo\n");
    pipeline.write(b"three\n");
    pipeline.close();

    let expected = vec!["one", "two", "three"];
    assert_eq!(drain(a).await, expected);
    assert_eq!(drain(b).await, expected);
}

#[tokio::test]
async fn close_flushes_partial_line() {
    let pipeline = OutputPipeline::new(Redactor::none());
    let rx = pipeline.subscribe("log", 16);
    pipeline.write(b"no newline at eof");
    pipeline.close();
    assert_eq!(drain(rx).await, vec!["no newline at eof"]);
}

#[tokio::test]
async fn write_after_close_is_ignored() {
    let pipeline = OutputPipeline::new(Redactor::none());
    let rx = pipeline.subscribe("log", 16);
    pipeline.close();
    pipeline.write(b"late\n");
    assert!(drain(rx).await.is_empty());
}

#[tokio::test]
async fn overflow_drops_oldest_and_emits_sentinel() {
    let pipeline = OutputPipeline::new(Redactor::none());
    let rx = pipeline.subscribe("slow", 2);

    for i in 0..5 {
        pipeline.write_line(&format!("line-{}", i));
    }
    pipeline.close();

    let got = drain(rx).await;
    // Three oldest dropped; sentinel surfaces first, then the survivors.
    assert_eq!(got[0], "[!] 3 lines dropped");
    assert_eq!(&got[1..], ["line-3", "line-4"]);
}

#[tokio::test]
async fn redaction_applies_before_fan_out() {
    let pipeline = OutputPipeline::new(Redactor::new(["hunter2"]));
    let a = pipeline.subscribe("a", 16);
    let b = pipeline.subscribe("b", 16);

    pipeline.write(b"password is hunter2\n");
    pipeline.close();

    assert_eq!(drain(a).await, vec!["password is [REDACTED]"]);
    assert_eq!(drain(b).await, vec!["password is [REDACTED]"]);
}

#[tokio::test]
async fn write_line_injects_agent_output() {
    let pipeline = OutputPipeline::new(Redactor::none());
    let rx = pipeline.subscribe("log", 16);
    pipeline.write_line("--- Running checkout");
    pipeline.close();
    assert_eq!(drain(rx).await, vec!["--- Running checkout"]);
}

#[tokio::test]
async fn slow_consumer_does_not_block_writer() {
    let pipeline = OutputPipeline::new(Redactor::none());
    // Never drained: the writer must still complete immediately.
    let _rx = pipeline.subscribe("stalled", 4);

    for _ in 0..10_000 {
        pipeline.write(b"spam\n");
    }
    pipeline.close();
}

#[tokio::test]
async fn receiver_wakes_on_late_lines() {
    let pipeline = std::sync::Arc::new(OutputPipeline::new(Redactor::none()));
    let mut rx = pipeline.subscribe("log", 16);

    let writer = std::sync::Arc::clone(&pipeline);
    let handle = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        writer.write(b"late line\n");
        writer.close();
    });

    assert_eq!(rx.recv().await.unwrap().text, "late line");
    assert_eq!(rx.recv().await, None);
    handle.await.unwrap();
}
