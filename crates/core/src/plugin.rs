// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin references: parsing, identity, and configuration flattening

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::environment::Environment;

/// Errors from plugin reference parsing.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("missing plugin location")]
    MissingLocation,
    #[error("too many #'s in {0:?}")]
    TooManyHashes(String),
    #[error("incomplete plugin path {0:?}")]
    IncompletePath(String),
    #[error("plugin definition is not an array")]
    NotAnArray,
    #[error("configuration for {0:?} is not a hash")]
    ConfigurationNotAHash(String),
    #[error("unknown shape in plugin definition: {0}")]
    UnknownShape(String),
    #[error("invalid plugin JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn scheme_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z+]+://").unwrap())
}

fn non_alnum_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9]+").unwrap())
}

/// A referenced git repository whose hooks are woven into the job's
/// extension points.
#[derive(Debug, Clone, PartialEq)]
pub struct Plugin {
    /// The reference as declared in the pipeline (shorthand preserved).
    pub declared: String,
    /// Host and path of the repository, without scheme or auth.
    pub location: String,
    /// Git ref from the URL fragment; `None` means the repository's
    /// default branch.
    pub version: Option<String>,
    /// Clone scheme (`https`, `ssh`, `file`, ...).
    pub scheme: String,
    /// Userinfo attached to the repository URL, if any.
    pub authentication: Option<String>,
    /// Free-form configuration from the pipeline definition.
    pub configuration: serde_json::Map<String, Value>,
}

impl Plugin {
    /// Parse a plugin reference.
    ///
    /// Accepts a full URL (`https://…`, `ssh://…`, `file://…`), an
    /// `owner/repo` shorthand (resolved against github.com) or a bare name
    /// (resolved against the `buildkite-plugins` GitHub organization). The
    /// URL fragment, when present, is the version.
    pub fn parse(reference: &str) -> Result<Self, PluginError> {
        Self::parse_with_config(reference, serde_json::Map::new())
    }

    /// Parse a plugin reference carrying pipeline configuration.
    pub fn parse_with_config(
        reference: &str,
        configuration: serde_json::Map<String, Value>,
    ) -> Result<Self, PluginError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(PluginError::MissingLocation);
        }
        if reference.matches('#').count() > 1 {
            return Err(PluginError::TooManyHashes(reference.to_string()));
        }

        let (base, version) = match reference.split_once('#') {
            Some((base, v)) if !v.is_empty() => (base, Some(v.to_string())),
            Some((base, _)) => (base, None),
            None => (reference, None),
        };

        let resolved = resolve_location(base)?;

        // Decompose scheme://[user@]host/path
        let (scheme, rest) = match resolved.split_once("://") {
            Some((s, rest)) => (s.to_string(), rest),
            None => ("https".to_string(), resolved.as_str()),
        };

        let (authentication, host_path) = match rest.split_once('@') {
            // Only treat `@` as userinfo when it appears before the path.
            Some((user, tail)) if !user.contains('/') => (Some(user.to_string()), tail),
            _ => (None, rest),
        };

        if host_path.is_empty() {
            return Err(PluginError::MissingLocation);
        }

        Ok(Self {
            declared: reference.to_string(),
            location: host_path.to_string(),
            version,
            scheme,
            authentication,
            configuration,
        })
    }

    /// Parse the pipeline's plugin document: a JSON array whose elements
    /// are either plain references or `{reference: configuration}` maps.
    pub fn from_json(json: &str) -> Result<Vec<Self>, PluginError> {
        let doc: Value = serde_json::from_str(json)?;
        let items = doc.as_array().ok_or(PluginError::NotAnArray)?;

        let mut plugins = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::String(reference) => plugins.push(Self::parse(reference)?),
                Value::Object(map) => {
                    for (reference, config) in map {
                        let config = match config {
                            Value::Object(config) => config.clone(),
                            Value::Null => serde_json::Map::new(),
                            _ => {
                                return Err(PluginError::ConfigurationNotAHash(reference.clone()))
                            }
                        };
                        plugins.push(Self::parse_with_config(reference, config)?);
                    }
                }
                other => return Err(PluginError::UnknownShape(other.to_string())),
            }
        }
        Ok(plugins)
    }

    /// Short name of the plugin: the last path segment, cleaned up.
    pub fn name(&self) -> String {
        let last = self.location.rsplit('/').next().unwrap_or("");
        let last_lower = last.to_lowercase();
        let name = non_alnum_re().replace_all(&last_lower, "-");
        name.replace("-buildkite-plugin-git", "")
            .replace("-buildkite-plugin", "")
    }

    /// Human-readable label, `location#version`.
    pub fn label(&self) -> String {
        match &self.version {
            Some(v) => format!("{}#{}", self.location, v),
            None => self.location.clone(),
        }
    }

    /// Deterministic filesystem-safe slug used as the cache directory
    /// name, derived from the declared reference and version.
    pub fn identifier(&self) -> String {
        let id = non_alnum_re().replace_all(&self.declared, "-");
        id.trim_matches('-').to_string()
    }

    /// The clonable repository URL (auth and scheme reattached).
    pub fn repository(&self) -> Result<String, PluginError> {
        let host = self.repository_host()?;

        let mut repo = host;
        if let Some(auth) = &self.authentication {
            repo = format!("{}@{}", auth, repo);
        }

        // Local filesystem plugins keep their bare path.
        if !repo.starts_with('/') {
            repo = format!("{}://{}", self.scheme, repo);
        }

        Ok(repo)
    }

    /// The subdirectory of the repository the plugin lives in, if the
    /// location points below the repository root.
    pub fn repository_subdirectory(&self) -> Result<String, PluginError> {
        let host = self.repository_host()?;
        let dir = self.location.strip_prefix(&host).unwrap_or("");
        Ok(dir.trim_start_matches('/').to_string())
    }

    /// Flatten the configuration map into `BUILDKITE_PLUGIN_<NAME>_<KEY>`
    /// variables. Keys are uppercased with non-alphanumerics collapsed to
    /// single underscores; array values are indexed `_0`, `_1`, …; output
    /// is sorted for determinism.
    pub fn configuration_to_environment(&self) -> Environment {
        let prefix = format!("BUILDKITE_PLUGIN_{}", self.name());

        let sorted: BTreeMap<&String, &Value> = self.configuration.iter().collect();
        let mut env = Environment::new();
        for (key, value) in sorted {
            let name = env_var_name(&format!("{}_{}", prefix, key));
            match value {
                Value::String(s) => {
                    env.set(&name, s.clone());
                }
                Value::Bool(b) => {
                    env.set(&name, b.to_string());
                }
                Value::Number(n) => {
                    env.set(&name, n.to_string());
                }
                Value::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        let indexed = format!("{}_{}", name, i);
                        match item {
                            Value::String(s) => {
                                env.set(&indexed, s.clone());
                            }
                            Value::Number(n) => {
                                env.set(&indexed, n.to_string());
                            }
                            Value::Bool(b) => {
                                env.set(&indexed, b.to_string());
                            }
                            other => {
                                tracing::warn!(
                                    plugin = %self.label(),
                                    key = %indexed,
                                    "skipping plugin configuration value of unsupported type: {}",
                                    other
                                );
                            }
                        }
                    }
                }
                other => {
                    tracing::warn!(
                        plugin = %self.label(),
                        key = %name,
                        "skipping plugin configuration value of unsupported type: {}",
                        other
                    );
                }
            }
        }
        env
    }

    /// The host + repository part of the location (the clone root).
    fn repository_host(&self) -> Result<String, PluginError> {
        if self.location.is_empty() {
            return Err(PluginError::MissingLocation);
        }

        let parts: Vec<&str> = self.location.split('/').collect();
        if parts.len() < 2 {
            return Err(PluginError::IncompletePath(self.location.clone()));
        }

        if matches!(parts[0], "github.com" | "bitbucket.org" | "gitlab.com") {
            if parts.len() < 3 {
                return Err(PluginError::IncompletePath(self.location.clone()));
            }
            return Ok(parts[..3].join("/"));
        }

        // Unknown hosts: take segments up to and including the first one
        // that ends in `.git`, else the whole location.
        let mut repo = Vec::new();
        for part in &parts {
            repo.push(*part);
            if part.ends_with(".git") {
                break;
            }
        }
        Ok(repo.join("/"))
    }
}

impl fmt::Display for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(auth) = &self.authentication {
            write!(f, "{}@", auth)?;
        }
        f.write_str(&self.location)?;
        if let Some(version) = &self.version {
            write!(f, "#{}", version)?;
        }
        Ok(())
    }
}

/// Resolve shorthand plugin locations to full URLs.
fn resolve_location(location: &str) -> Result<String, PluginError> {
    if location.is_empty() {
        return Err(PluginError::MissingLocation);
    }
    if scheme_re().is_match(location) {
        return Ok(location.to_string());
    }
    // Local filesystem paths are used verbatim with a file scheme.
    if location.starts_with('/') {
        return Ok(format!("file://{}", location));
    }

    let parts = location.split('/').count();
    Ok(match parts {
        // domain.com/owner/repo with the scheme left off
        n if n >= 3 => format!("https://{}", location),
        // owner/repo
        2 => format!("https://github.com/{}", location),
        // bare name
        _ => format!("https://github.com/buildkite-plugins/{}", location),
    })
}

/// Uppercase and collapse a string into an environment variable name.
/// Runs of non-alphanumerics become a single underscore.
fn env_var_name(raw: &str) -> String {
    non_alnum_re()
        .replace_all(&raw.to_uppercase(), "_")
        .into_owned()
}

/// Merge job-declared plugins with agent-declared plugins, deduplicating
/// by location. The agent's declaration wins on conflict.
pub fn merge_plugins(job_plugins: Vec<Plugin>, agent_plugins: Vec<Plugin>) -> Vec<Plugin> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut result = Vec::with_capacity(job_plugins.len() + agent_plugins.len());

    for plugin in agent_plugins {
        seen.insert(plugin.location.clone());
        result.push(plugin);
    }

    for plugin in job_plugins {
        if seen.contains(&plugin.location) {
            tracing::debug!(
                location = %plugin.location,
                "plugin declared by both agent and job, using agent version"
            );
        } else {
            seen.insert(plugin.location.clone());
            result.push(plugin);
        }
    }

    result
}

#[cfg(test)]
#[path = "plugin_tests.rs"]
mod tests;
