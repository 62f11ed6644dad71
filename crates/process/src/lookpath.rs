// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executable resolution against an explicit PATH.
//!
//! The job environment carries its own PATH (hooks prepend to it), so
//! resolution honours that instead of the agent's inherited one. Windows
//! additionally probes the extensions listed in PATHEXT.

use std::path::{Path, PathBuf};

/// Locate `name` on `path_var`, absolutizing the result.
///
/// `name` containing a path separator is resolved against the working
/// directory rather than searched. `pathext` is only consulted on
/// Windows; pass the job's `PATHEXT` value (or empty for the default).
pub fn find_executable(name: &str, path_var: &str, pathext: &str) -> Option<PathBuf> {
    let as_path = Path::new(name);
    if as_path.is_absolute() {
        return executable_at(as_path).then(|| as_path.to_path_buf());
    }

    if name.contains(std::path::MAIN_SEPARATOR) || name.contains('/') {
        let candidate = std::env::current_dir().ok()?.join(as_path);
        return executable_at(&candidate).then_some(candidate);
    }

    for dir in std::env::split_paths(path_var) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        for candidate_name in candidate_names(name, pathext) {
            let candidate = dir.join(&candidate_name);
            if executable_at(&candidate) {
                return Some(absolutize(candidate));
            }
        }
    }

    None
}

#[cfg(windows)]
fn candidate_names(name: &str, pathext: &str) -> Vec<String> {
    // A name that already carries an extension is probed as-is first.
    let mut names = vec![name.to_string()];
    let exts = if pathext.is_empty() {
        ".COM;.EXE;.BAT;.CMD".to_string()
    } else {
        pathext.to_string()
    };
    for ext in exts.split(';').filter(|e| !e.is_empty()) {
        names.push(format!("{}{}", name, ext));
    }
    names
}

#[cfg(not(windows))]
fn candidate_names(name: &str, _pathext: &str) -> Vec<String> {
    vec![name.to_string()]
}

#[cfg(unix)]
fn executable_at(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn executable_at(path: &Path) -> bool {
    path.is_file()
}

fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&path))
            .unwrap_or(path)
    }
}

#[cfg(test)]
#[path = "lookpath_tests.rs"]
mod tests;
