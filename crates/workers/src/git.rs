// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git plumbing for patch capture and patch pre-application.

use crate::subprocess::{command_in, run_with_timeout, GIT_TIMEOUT};
use std::path::Path;

pub fn is_git_repo(dir: &Path) -> bool {
    dir.join(".git").exists()
}

/// Current HEAD commit, or `None` outside a repository / before the
/// first commit.
pub async fn head_commit(dir: &Path) -> Option<String> {
    let cmd = command_in(dir, "git", &["rev-parse", "HEAD"]);
    let output = run_with_timeout(cmd, GIT_TIMEOUT, "git rev-parse").await.ok()?;
    if !output.status.success() {
        return None;
    }
    let head = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!head.is_empty()).then_some(head)
}

/// Working-tree diff since `base` (or against HEAD when no base was
/// captured). Returns an empty string when there is nothing to show.
pub async fn diff_since(dir: &Path, base: Option<&str>) -> String {
    let args: Vec<&str> = match base {
        Some(commit) => vec!["diff", commit],
        None => vec!["diff", "HEAD"],
    };
    let cmd = command_in(dir, "git", &args);
    match run_with_timeout(cmd, GIT_TIMEOUT, "git diff").await {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).into_owned()
        }
        _ => String::new(),
    }
}

/// Apply a patch file to the working tree.
pub async fn apply_patch(dir: &Path, patch: &Path) -> Result<(), String> {
    let patch_str = patch.to_string_lossy().into_owned();
    let cmd = command_in(dir, "git", &["apply", "--whitespace=nowarn", &patch_str]);
    let output = run_with_timeout(cmd, GIT_TIMEOUT, "git apply").await?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(format!(
        "git apply {} failed (exit {}): {}",
        patch.display(),
        output.status.code().unwrap_or(-1),
        stderr.trim()
    ))
}
