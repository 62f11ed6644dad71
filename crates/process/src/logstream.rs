// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ordered log upload stream.
//!
//! One pipeline consumer forwards redacted lines to the control plane in
//! batched chunks, preserving source order. Failed chunks are kept and
//! retried on the next tick rather than dropped, so the uploaded log
//! never reorders.

use std::sync::Arc;
use std::time::Duration;

use rig_api::ControlPlane;

use crate::pipeline::LineReceiver;

/// Flush cadence for buffered log output.
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Flush early once this much output has accumulated.
const FLUSH_THRESHOLD_BYTES: usize = 64 * 1024;

/// Forward lines from `rx` to the control plane until the pipeline
/// closes, then flush the remainder. When `echo` is set, lines are also
/// written to the agent's stdout.
pub async fn stream_logs(mut rx: LineReceiver, api: Arc<dyn ControlPlane>, job_id: &str, echo: bool) {
    let mut chunk = String::new();
    let mut interval = tokio::time::interval(FLUSH_INTERVAL);

    loop {
        tokio::select! {
            line = rx.recv() => {
                match line {
                    Some(line) => {
                        if echo {
                            println!("{}", line.text);
                        }
                        chunk.push_str(&line.text);
                        chunk.push('\n');
                        if chunk.len() >= FLUSH_THRESHOLD_BYTES {
                            flush(api.as_ref(), job_id, &mut chunk).await;
                        }
                    }
                    None => {
                        // End of stream: give the final chunk a few tries
                        // so the log tail survives a transient failure.
                        for attempt in 0..3 {
                            if attempt > 0 {
                                tokio::time::sleep(FLUSH_INTERVAL).await;
                            }
                            flush(api.as_ref(), job_id, &mut chunk).await;
                            if chunk.is_empty() {
                                break;
                            }
                        }
                        return;
                    }
                }
            }
            _ = interval.tick() => {
                flush(api.as_ref(), job_id, &mut chunk).await;
            }
        }
    }
}

async fn flush(api: &dyn ControlPlane, job_id: &str, chunk: &mut String) {
    if chunk.is_empty() {
        return;
    }
    match api.append_log(job_id, chunk).await {
        Ok(()) => chunk.clear(),
        // Keep the chunk; order is preserved by retrying it whole.
        Err(e) => tracing::warn!(error = %e, "failed to upload log chunk, will retry"),
    }
}

#[cfg(test)]
#[path = "logstream_tests.rs"]
mod tests;
