// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-line secret redaction

use std::borrow::Cow;

use rig_core::Environment;

/// Replacement token for redacted secret values.
pub const REDACTED_PLACEHOLDER: &str = "[REDACTED]";

/// Default variable-name patterns whose values are treated as secrets.
pub const DEFAULT_SECRET_VAR_PATTERNS: &[&str] = &[
    "*_PASSWORD",
    "*_SECRET",
    "*_TOKEN",
    "*_ACCESS_KEY",
    "*_SECRET_KEY",
    "*_PRIVATE_KEY",
    "*_CONNECTION_STRING",
];

/// Replaces occurrences of known secret values in log lines.
///
/// Matching is plain substring and case-sensitive. Redaction never spans
/// line boundaries, so a secret containing a newline is not redacted
/// (a known limitation — multi-line values are split by the scanner
/// before they reach us).
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    /// Build a redactor from secret values. Empty values are skipped.
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut secrets: Vec<String> = values
            .into_iter()
            .map(Into::into)
            .filter(|v| !v.is_empty())
            .collect();
        // Longest first so overlapping secrets redact fully.
        secrets.sort_by(|a, b| b.len().cmp(&a.len()));
        secrets.dedup();
        Self { secrets }
    }

    /// A redactor with nothing to redact.
    pub fn none() -> Self {
        Self::default()
    }

    /// Derive secret values from the environment: every variable whose
    /// name matches one of `patterns` (glob syntax, e.g. `*_PASSWORD`)
    /// contributes its value.
    pub fn from_environment(env: &Environment, patterns: &[String]) -> Self {
        let compiled: Vec<glob::Pattern> = patterns
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::warn!(pattern = %p, error = %e, "ignoring invalid secret-var pattern");
                    None
                }
            })
            .collect();

        let values = env
            .iter()
            .filter(|(name, _)| compiled.iter().any(|p| p.matches(name)))
            .map(|(_, value)| value.to_string());

        Self::new(values)
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Replace each secret occurrence in `line` with the placeholder.
    pub fn redact<'a>(&self, line: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(line);
        for secret in &self.secrets {
            if out.contains(secret.as_str()) {
                out = Cow::Owned(out.replace(secret.as_str(), REDACTED_PLACEHOLDER));
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "redact_tests.rs"]
mod tests;
