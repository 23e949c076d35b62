// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TTL sweep of artifact and workspace trees.
//!
//! A per-job directory is removed once `max(mtime, atime)` is older than
//! the configured TTL. Jobs the caller marks as protected (anything in a
//! non-terminal queue folder) are never reaped, whatever their age.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::debug;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetentionStats {
    pub removed_artifacts: usize,
    pub removed_workspaces: usize,
}

/// Sweep both roots. A TTL of zero disables the corresponding sweep.
pub fn run_retention(
    artifacts_root: &Path,
    workspaces_root: &Path,
    artifacts_ttl: Duration,
    workspaces_ttl: Duration,
    protected_job_ids: &HashSet<String>,
) -> RetentionStats {
    RetentionStats {
        removed_artifacts: sweep_root(artifacts_root, artifacts_ttl, protected_job_ids),
        removed_workspaces: sweep_root(workspaces_root, workspaces_ttl, protected_job_ids),
    }
}

fn sweep_root(root: &Path, ttl: Duration, protected: &HashSet<String>) -> usize {
    if ttl.is_zero() || !root.exists() {
        return 0;
    }
    let Ok(canonical_root) = root.canonicalize() else {
        return 0;
    };
    let Ok(entries) = fs::read_dir(root) else {
        return 0;
    };

    let now = SystemTime::now();
    let mut removed = 0;

    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if protected.contains(&name) {
            continue;
        }
        // Never follow a symlinked entry out of the root.
        if path.is_symlink() || !path.is_dir() {
            continue;
        }
        let Ok(resolved) = path.canonicalize() else {
            continue;
        };
        if !resolved.starts_with(&canonical_root) {
            continue;
        }
        let Some(age) = dir_age(&entry, now) else {
            continue;
        };
        if age < ttl {
            continue;
        }
        if fs::remove_dir_all(&path).is_ok() {
            debug!(dir = %path.display(), "retention removed expired tree");
            removed += 1;
        }
    }
    removed
}

/// Age by the most recent of mtime and atime.
fn dir_age(entry: &fs::DirEntry, now: SystemTime) -> Option<Duration> {
    let meta = entry.metadata().ok()?;
    let mtime = meta.modified().ok()?;
    let freshest = match meta.accessed() {
        Ok(atime) => mtime.max(atime),
        Err(_) => mtime,
    };
    now.duration_since(freshest).ok()
}

#[cfg(test)]
#[path = "retention_tests.rs"]
mod tests;
