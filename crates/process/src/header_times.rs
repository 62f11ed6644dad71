// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Header timestamp side stream.
//!
//! Log lines beginning with a section marker (`---`, `+++`, `~~~`) are
//! timestamped so the control plane can render per-section timing. The
//! header regexes must stay in sync with the control plane's own log
//! parsing.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use regex::Regex;
use rig_api::ControlPlane;
use tokio::sync::watch;

/// Flush cadence for pending timestamps.
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(---|\+\+\+|~~~)\s").unwrap())
}

fn header_expansion_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\^\^\^\s\+\+\+").unwrap())
}

fn ansi_colour_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[([;\d]+)?[mK]").unwrap())
}

/// Collects header timestamps and streams them to the control plane.
///
/// `scan` is called per line by a pipeline consumer; `stream` runs as its
/// own task, flushing at most once a second and once more on shutdown.
/// The upload cursor only advances on acknowledgement, so a failed flush
/// is retried with the same indices (the payload is idempotent).
#[derive(Clone, Default)]
pub struct HeaderTimesStreamer {
    times: Arc<Mutex<Vec<String>>>,
}

impl HeaderTimesStreamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a timestamp if `line` is a section header. Returns true for
    /// header and header-expansion lines.
    pub fn scan(&self, line: &str) -> bool {
        // Colour escapes may precede the marker; strip before matching.
        let line = ansi_colour_re().replace_all(line, "");

        if !header_re().is_match(&line) {
            return header_expansion_re().is_match(&line);
        }

        tracing::debug!(header = %line, "found header");
        self.times
            .lock()
            .push(Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true));
        true
    }

    /// Number of timestamps recorded so far.
    pub fn len(&self) -> usize {
        self.times.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.lock().is_empty()
    }

    /// Stream pending timestamps until `shutdown` fires, then flush once
    /// more and return.
    pub async fn stream(
        &self,
        api: Arc<dyn ControlPlane>,
        job_id: &str,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut cursor = 0usize;
        let mut interval = tokio::time::interval(FLUSH_INTERVAL);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    cursor = self.flush(api.as_ref(), job_id, cursor).await;
                }
                _ = shutdown.changed() => {
                    self.flush(api.as_ref(), job_id, cursor).await;
                    return;
                }
            }
        }
    }

    /// Upload timestamps from `cursor` onwards, returning the new cursor.
    async fn flush(&self, api: &dyn ControlPlane, job_id: &str, cursor: usize) -> usize {
        let (payload, total) = {
            let times = self.times.lock();
            if times.len() == cursor {
                return cursor;
            }
            let payload: BTreeMap<usize, String> = times[cursor..]
                .iter()
                .cloned()
                .enumerate()
                .map(|(i, t)| (cursor + i, t))
                .collect();
            (payload, times.len())
        };

        match api.save_header_times(job_id, &payload).await {
            Ok(()) => total,
            Err(e) => {
                tracing::warn!(error = %e, "failed to upload header times, will retry");
                cursor
            }
        }
    }
}

#[cfg(test)]
#[path = "header_times_tests.rs"]
mod tests;
