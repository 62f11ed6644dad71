// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Byte stream to line records

/// Upper bound on a single line; longer runs are split at the boundary
/// and flagged.
pub const MAX_LINE_LEN: usize = 1024 * 1024;

/// One line of child output.
///
/// The terminator (`\n` or `\r\n`) is stripped. Bare `\r` characters
/// inside the line are preserved; terminals use them for in-place
/// updates (progress bars) and the control plane renders them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub text: String,
    /// Set when the line exceeded [`MAX_LINE_LEN`] and was split.
    pub truncated: bool,
}

impl Line {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            truncated: false,
        }
    }
}

/// Incremental scanner from a byte stream to [`Line`] records.
///
/// Tolerates partial lines: bytes without a terminator are buffered until
/// more input arrives or [`LineScanner::finish`] flushes them.
#[derive(Debug, Default)]
pub struct LineScanner {
    buf: Vec<u8>,
}

impl LineScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning any lines completed by this chunk.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Line> {
        self.buf.extend_from_slice(bytes);

        let mut lines = Vec::new();
        loop {
            match find_byte(&self.buf, b'\n') {
                Some(pos) if pos <= MAX_LINE_LEN => {
                    let raw: Vec<u8> = self.buf.drain(..=pos).collect();
                    lines.push(make_line(&raw[..raw.len() - 1], false));
                    continue;
                }
                None if self.buf.len() < MAX_LINE_LEN => break,
                // No terminator within the bound: split there and flag.
                _ => {
                    let head: Vec<u8> = self.buf.drain(..MAX_LINE_LEN).collect();
                    lines.push(make_line_raw(&head, true));
                }
            }
        }

        lines
    }

    /// Flush any trailing bytes as a final partial line.
    pub fn finish(&mut self) -> Option<Line> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(make_line_raw(&rest, false))
    }
}

fn find_byte(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}

/// Build a line from bytes terminated by `\n`, stripping a preceding `\r`.
fn make_line(bytes: &[u8], truncated: bool) -> Line {
    let bytes = match bytes.last() {
        Some(b'\r') => &bytes[..bytes.len() - 1],
        _ => bytes,
    };
    make_line_raw(bytes, truncated)
}

/// Build a line without terminator handling (splits and partials keep
/// every byte, including a trailing `\r`).
fn make_line_raw(bytes: &[u8], truncated: bool) -> Line {
    Line {
        text: String::from_utf8_lossy(bytes).into_owned(),
        truncated,
    }
}

#[cfg(test)]
#[path = "scanner_tests.rs"]
mod tests;
