// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broadcast from one output stream to bounded line consumers.
//!
//! The writer (a child process copy task) pushes bytes; the scanner turns
//! them into lines; each line is redacted once and appended to every
//! consumer's queue. Queues are bounded: on overflow the oldest line is
//! dropped and a sentinel is surfaced in the consumer's stream. The
//! writer never blocks on a slow consumer.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::redact::Redactor;
use crate::scanner::{Line, LineScanner};

/// Default per-consumer queue capacity, in lines.
pub const DEFAULT_CONSUMER_CAPACITY: usize = 4096;

struct Queue {
    lines: VecDeque<Line>,
    /// Lines dropped since the consumer last saw a sentinel.
    dropped: u64,
    closed: bool,
}

struct Consumer {
    name: String,
    capacity: usize,
    queue: Mutex<Queue>,
    notify: Notify,
}

/// Receiving end of one pipeline subscription.
pub struct LineReceiver {
    shared: Arc<Consumer>,
}

impl LineReceiver {
    /// Next line in source order, or `None` once the pipeline is closed
    /// and drained. Dropped-line sentinels appear in-stream.
    pub async fn recv(&mut self) -> Option<Line> {
        loop {
            let notified = self.shared.notify.notified();
            {
                let mut q = self.shared.queue.lock();
                if q.dropped > 0 {
                    let n = std::mem::take(&mut q.dropped);
                    return Some(Line::new(format!("[!] {} lines dropped", n)));
                }
                if let Some(line) = q.lines.pop_front() {
                    return Some(line);
                }
                if q.closed {
                    return None;
                }
            }
            notified.await;
        }
    }
}

struct ScannerState {
    scanner: LineScanner,
    closed: bool,
}

/// Fan-out from one byte stream to N line-oriented consumers.
pub struct OutputPipeline {
    redactor: Redactor,
    state: Mutex<ScannerState>,
    consumers: Mutex<Vec<Arc<Consumer>>>,
}

impl OutputPipeline {
    pub fn new(redactor: Redactor) -> Self {
        Self {
            redactor,
            state: Mutex::new(ScannerState {
                scanner: LineScanner::new(),
                closed: false,
            }),
            consumers: Mutex::new(Vec::new()),
        }
    }

    /// Register a consumer. Subscriptions made after lines have been
    /// dispatched only observe subsequent lines.
    pub fn subscribe(&self, name: &str, capacity: usize) -> LineReceiver {
        let shared = Arc::new(Consumer {
            name: name.to_string(),
            capacity: capacity.max(1),
            queue: Mutex::new(Queue {
                lines: VecDeque::new(),
                dropped: 0,
                closed: false,
            }),
            notify: Notify::new(),
        });
        self.consumers.lock().push(Arc::clone(&shared));
        LineReceiver { shared }
    }

    /// Feed raw child output. Thread-safe; callable from blocking reader
    /// threads and async copy tasks alike.
    pub fn write(&self, bytes: &[u8]) {
        let lines = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.scanner.feed(bytes)
        };
        self.dispatch(lines);
    }

    /// Inject one complete line (agent-generated output such as phase
    /// headers). Takes the same redaction path as child output.
    pub fn write_line(&self, text: &str) {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(b'\n');
        self.write(&bytes);
    }

    /// Close the writer side: flush any partial line and let consumers
    /// drain to end-of-stream. Idempotent.
    pub fn close(&self) {
        let partial = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.scanner.finish()
        };
        if let Some(line) = partial {
            self.dispatch(vec![line]);
        }

        for consumer in self.consumers.lock().iter() {
            consumer.queue.lock().closed = true;
            consumer.notify.notify_one();
        }
    }

    fn dispatch(&self, lines: Vec<Line>) {
        if lines.is_empty() {
            return;
        }

        let consumers = self.consumers.lock();
        for line in lines {
            let redacted = match self.redactor.redact(&line.text) {
                std::borrow::Cow::Borrowed(_) => line,
                std::borrow::Cow::Owned(text) => Line {
                    text,
                    truncated: line.truncated,
                },
            };

            for consumer in consumers.iter() {
                let mut q = consumer.queue.lock();
                if q.closed {
                    continue;
                }
                if q.lines.len() >= consumer.capacity {
                    q.lines.pop_front();
                    q.dropped += 1;
                    if q.dropped == 1 {
                        tracing::warn!(
                            consumer = %consumer.name,
                            "consumer queue full, dropping oldest lines"
                        );
                    }
                }
                q.lines.push_back(redacted.clone());
                drop(q);
                consumer.notify.notify_one();
            }
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
