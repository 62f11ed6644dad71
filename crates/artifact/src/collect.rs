// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Expanding artifact prospects into a deduplicated, hashed file set.
//!
//! Prospects are semicolon-delimited glob patterns (directories and
//! absolute paths included). Each resulting file is opened once and
//! streamed through SHA-1 and SHA-256 in a single pass.

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha1::Digest;
use thiserror::Error;

use rig_core::{content_type_for, Artifact, ArtifactState};

/// Separator between prospects in an artifact path list.
pub const PROSPECT_DELIMITER: char = ';';

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("invalid glob pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// How prospects are resolved.
#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Directory relative patterns resolve against, and relative reported
    /// paths are computed from.
    pub working_dir: PathBuf,
    /// Skip symlinked files entirely.
    pub skip_symlinks: bool,
    /// Report paths with `/` separators on every platform.
    pub normalize_separators: bool,
}

impl CollectOptions {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            skip_symlinks: false,
            normalize_separators: false,
        }
    }
}

/// Expand `paths` into hashed [`Artifact`]s.
///
/// Directory prospects are walked recursively; the rest are expanded as
/// globs (`*` within a segment, `**` across segments). Files are deduped
/// on their symlink-resolved absolute path. A prospect that matches only
/// directories, or nothing at all, contributes zero artifacts without
/// error.
pub fn collect(paths: &str, opts: &CollectOptions) -> Result<Vec<Artifact>, CollectError> {
    // Canonicalize once so relative reported paths survive a symlinked
    // working directory (macOS /tmp, for one).
    let mut opts = opts.clone();
    opts.working_dir =
        std::fs::canonicalize(&opts.working_dir).unwrap_or_else(|_| opts.working_dir.clone());
    let opts = &opts;

    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut artifacts = Vec::new();

    for prospect in paths.split(PROSPECT_DELIMITER) {
        let prospect = prospect.trim();
        if prospect.is_empty() {
            continue;
        }

        tracing::debug!(prospect, "searching for artifacts");

        let literal = resolve_against(&opts.working_dir, Path::new(prospect));
        if literal.is_dir() {
            let mut files = Vec::new();
            walk_dir(&literal, &mut files).map_err(|source| CollectError::Io {
                path: literal.clone(),
                source,
            })?;
            files.sort();
            for file in files {
                add_file(&file, prospect, opts, &mut seen, &mut artifacts)?;
            }
            continue;
        }

        let pattern = resolve_against(&opts.working_dir, Path::new(prospect))
            .to_string_lossy()
            .into_owned();
        let matches = glob::glob(&pattern).map_err(|source| CollectError::Pattern {
            pattern: prospect.to_string(),
            source,
        })?;

        for entry in matches {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(prospect, error = %e, "skipping unreadable glob match");
                    continue;
                }
            };
            if path.is_dir() {
                tracing::debug!(path = %path.display(), "skipping directory match");
                continue;
            }
            add_file(&path, prospect, opts, &mut seen, &mut artifacts)?;
        }
    }

    Ok(artifacts)
}

fn add_file(
    path: &Path,
    prospect: &str,
    opts: &CollectOptions,
    seen: &mut HashSet<PathBuf>,
    artifacts: &mut Vec<Artifact>,
) -> Result<(), CollectError> {
    if opts.skip_symlinks && is_symlink(path) {
        tracing::debug!(path = %path.display(), "skipping symlink");
        return Ok(());
    }

    // Dedupe on the symlink-resolved absolute path so the same file
    // reached through two prospects uploads once.
    let resolved = std::fs::canonicalize(path).map_err(|source| CollectError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if !seen.insert(resolved.clone()) {
        tracing::debug!(path = %path.display(), "skipping duplicate path");
        return Ok(());
    }

    let base = if Path::new(prospect).is_absolute() {
        // Absolute patterns report paths relative to the filesystem root.
        root_of(&resolved)
    } else {
        opts.working_dir.clone()
    };

    let relative = resolved
        .strip_prefix(&base)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| resolved.clone());

    let mut reported = relative.to_string_lossy().into_owned();
    if opts.normalize_separators {
        reported = reported.replace(std::path::MAIN_SEPARATOR, "/");
    }

    artifacts.push(build(reported, resolved, prospect)?);
    Ok(())
}

/// Hash and size one file, producing its artifact record.
fn build(path: String, absolute_path: PathBuf, glob_path: &str) -> Result<Artifact, CollectError> {
    let io_err = |source| CollectError::Io {
        path: absolute_path.clone(),
        source,
    };

    let mut file = std::fs::File::open(&absolute_path).map_err(io_err)?;
    let file_size = file.metadata().map_err(io_err)?.len();

    let mut sha1 = sha1::Sha1::new();
    let mut sha256 = sha2::Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(io_err)?;
        if n == 0 {
            break;
        }
        sha1.update(&buf[..n]);
        sha256.update(&buf[..n]);
    }

    let content_type = content_type_for(&absolute_path).to_string();

    Ok(Artifact {
        path,
        glob_path: glob_path.to_string(),
        file_size,
        sha1sum: hex::encode(sha1.finalize()),
        sha256sum: hex::encode(sha256.finalize()),
        content_type,
        absolute_path,
        id: None,
        url: None,
        state: ArtifactState::Pending,
    })
}

fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk_dir(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

#[cfg(windows)]
fn root_of(path: &Path) -> PathBuf {
    use std::path::Component;
    match path.components().next() {
        Some(Component::Prefix(prefix)) => PathBuf::from(prefix.as_os_str()).join("\\"),
        _ => PathBuf::from("\\"),
    }
}

#[cfg(not(windows))]
fn root_of(_path: &Path) -> PathBuf {
    PathBuf::from("/")
}

#[cfg(test)]
#[path = "collect_tests.rs"]
mod tests;
