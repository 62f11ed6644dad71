// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rig-process: child process execution and the job output pipeline.
//!
//! One child writes; the pipeline scans bytes into lines, redacts them,
//! and broadcasts each line to bounded per-consumer queues (log streamer,
//! header-time detector). Consumers never block the writer; overload is
//! lossy, not blocking.

pub mod header_times;
pub mod logstream;
pub mod lookpath;
pub mod pipeline;
pub mod redact;
pub mod runner;
pub mod scanner;

pub use header_times::HeaderTimesStreamer;
pub use logstream::stream_logs;
pub use pipeline::{LineReceiver, OutputPipeline};
pub use redact::{Redactor, DEFAULT_SECRET_VAR_PATTERNS, REDACTED_PLACEHOLDER};
pub use runner::{ProcessHandle, RunConfig, Runner, RunnerError};
pub use scanner::{Line, LineScanner, MAX_LINE_LEN};
