// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook extension points

use std::fmt;
use std::path::{Path, PathBuf};

use crate::environment::Environment;

/// The fixed extension points a job exposes, in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookName {
    Environment,
    PreCheckout,
    Checkout,
    PostCheckout,
    PreCommand,
    Command,
    PostCommand,
    PreArtifact,
    PostArtifact,
    PreExit,
}

impl HookName {
    /// All extension points, in lifecycle order.
    pub const ALL: [HookName; 10] = [
        HookName::Environment,
        HookName::PreCheckout,
        HookName::Checkout,
        HookName::PostCheckout,
        HookName::PreCommand,
        HookName::Command,
        HookName::PostCommand,
        HookName::PreArtifact,
        HookName::PostArtifact,
        HookName::PreExit,
    ];

    /// The on-disk script name for this hook (before platform suffixing).
    pub fn as_str(self) -> &'static str {
        match self {
            HookName::Environment => "environment",
            HookName::PreCheckout => "pre-checkout",
            HookName::Checkout => "checkout",
            HookName::PostCheckout => "post-checkout",
            HookName::PreCommand => "pre-command",
            HookName::Command => "command",
            HookName::PostCommand => "post-command",
            HookName::PreArtifact => "pre-artifact",
            HookName::PostArtifact => "post-artifact",
            HookName::PreExit => "pre-exit",
        }
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a hook script was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookScope {
    /// The agent's hooks directory.
    Global,
    /// The repository's own hooks directory inside the checkout.
    Local,
    /// A materialized plugin's hooks directory.
    Plugin,
}

impl fmt::Display for HookScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookScope::Global => f.write_str("global"),
            HookScope::Local => f.write_str("local"),
            HookScope::Plugin => f.write_str("plugin"),
        }
    }
}

/// A hook resolved to a concrete script path.
///
/// Exists conceptually for every (scope, name) pair; a spec is only built
/// when a file is actually present at the expected path.
#[derive(Debug, Clone)]
pub struct HookSpec {
    pub name: HookName,
    pub scope: HookScope,
    pub path: PathBuf,
    /// Extra environment scoped to this hook invocation (plugin
    /// configuration variables).
    pub extra_env: Option<Environment>,
}

/// Platform-specific script file name for a hook.
pub fn script_file_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.bat", name)
    } else {
        name.to_string()
    }
}

/// Path a hook would live at inside a hooks directory.
pub fn hook_path(dir: &Path, name: HookName) -> PathBuf {
    dir.join(script_file_name(name.as_str()))
}

#[cfg(test)]
#[path = "hook_tests.rs"]
mod tests;
