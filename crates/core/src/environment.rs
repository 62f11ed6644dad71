// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job environment: an ordered, case-aware key/value store.
//!
//! Shared by the hook executor (env dump parsing and diffing) and the
//! command runner (child process environments).

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

/// Matches a line that starts a new variable in an env dump.
///
/// Lines that do not match are continuations of the previous variable's
/// value (multi-line values, e.g. exported shell functions or PEM blobs).
fn variable_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z][A-Za-z0-9_]*)=(.+)$").unwrap())
}

/// An ordered mapping of environment variable names to values.
///
/// Keys are case-preserving on POSIX and folded to upper case on Windows
/// (where the OS treats them case-insensitively). Iteration and
/// serialization are in sorted key order so output is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current OS environment.
    pub fn from_os() -> Self {
        let mut env = Self::new();
        for (key, value) in std::env::vars() {
            env.set(&key, value);
        }
        env
    }

    /// Build an environment from key/value pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut env = Self::new();
        for (key, value) in pairs {
            env.set(key.as_ref(), value);
        }
        env
    }

    /// Parse an environment from `KEY=VALUE` lines.
    ///
    /// A line matching `^[A-Za-z][A-Za-z0-9_]*=.+` starts a new variable;
    /// any other line is appended to the previous variable's value, joined
    /// with `\n`. Values wrapped in single or double quotes have the quotes
    /// stripped and `\"` / `\n` escape sequences expanded.
    pub fn from_slice<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut env = Self::new();
        let mut current_key: Option<String> = None;
        let mut current_value: Vec<String> = Vec::new();

        // Entries may themselves carry embedded newlines (a serialized
        // multi-line value is one KEY=VALUE entry); treat every physical
        // line the same either way.
        for line in lines.iter().flat_map(|entry| entry.as_ref().split('\n')) {
            if let Some(caps) = variable_line_re().captures(line) {
                if let Some(key) = current_key.take() {
                    env.set(&key, unquote(&current_value.join("\n")));
                }
                current_key = Some(caps[1].to_string());
                current_value = vec![caps[2].to_string()];
            } else if current_key.is_some() {
                current_value.push(line.to_string());
            }
        }

        if let Some(key) = current_key {
            env.set(&key, unquote(&current_value.join("\n")));
        }

        env
    }

    /// Parse an environment dump file (`env` on POSIX, `set` on Windows).
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let body = std::fs::read_to_string(path)?;
        let lines: Vec<&str> = body.lines().collect();
        Ok(Self::from_slice(&lines))
    }

    /// Look up a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(&fold_key(key)).map(String::as_str)
    }

    /// Look up a variable, defaulting to the empty string.
    pub fn value(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    /// Whether a variable is present.
    pub fn exists(&self, key: &str) -> bool {
        self.vars.contains_key(&fold_key(key))
    }

    /// Set a variable, returning the previous value if any.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Option<String> {
        self.vars.insert(fold_key(key), value.into())
    }

    /// Remove a variable, returning its value if it was present.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.vars.remove(&fold_key(key))
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the environment is empty.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Variables in `self` that are absent from or different in `base`.
    ///
    /// Variables removed relative to `base` are not represented; applying
    /// the diff to `base` yields `self`'s additions and changes only.
    pub fn diff(&self, base: &Environment) -> Environment {
        let mut out = Environment::new();
        for (key, value) in &self.vars {
            if base.get(key) != Some(value.as_str()) {
                out.set(key, value.clone());
            }
        }
        out
    }

    /// A copy of `self` with `other`'s variables layered over the top.
    pub fn merge(&self, other: &Environment) -> Environment {
        let mut out = self.clone();
        out.apply(other);
        out
    }

    /// Apply `other`'s variables in place (other wins on conflict).
    pub fn apply(&mut self, other: &Environment) {
        for (key, value) in &other.vars {
            self.set(key, value.clone());
        }
    }

    /// Serialize to sorted `KEY=VALUE` strings.
    pub fn to_slice(&self) -> Vec<String> {
        self.vars
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }

    /// Iterate variables in sorted key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(windows)]
fn fold_key(key: &str) -> String {
    key.trim().to_uppercase()
}

#[cfg(not(windows))]
fn fold_key(key: &str) -> String {
    key.trim().to_string()
}

/// Strip matching edge quotes and expand `\"` / `\n` escapes.
fn unquote(value: &str) -> String {
    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if !quoted {
        return value.to_string();
    }

    value[1..value.len() - 1]
        .replace("\\\"", "\"")
        .replace("\\n", "\n")
}

#[cfg(test)]
#[path = "environment_tests.rs"]
mod tests;
