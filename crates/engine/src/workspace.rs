// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job isolated workspaces under `WORKSPACES_ROOT/<job_id>/work/`.
//!
//! The source repository is materialized by `git clone --local` when it
//! is a git repo, by a symlink-refusing copy otherwise. Every path is
//! checked to stay inside the workspaces root after full resolution;
//! a symlink anywhere in the ancestry that points outside fails the job.
//! Teardown belongs to the retention sweeper, never to the runner.

use crate::config::Settings;
use gantry_workers::subprocess::{command_in, run_with_timeout, GIT_TIMEOUT};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("invalid job_id for a workspace path: '{0}'")]
    InvalidJobId(String),
    #[error("unknown project alias '{0}'")]
    UnknownProject(String),
    #[error("absolute workdir paths are not permitted by configuration")]
    AbsoluteWorkdirForbidden,
    #[error("source workdir does not exist: {0}")]
    MissingSource(PathBuf),
    #[error("refusing symlink path component: {0}")]
    SymlinkRejected(PathBuf),
    #[error("path escapes the workspaces root: {0}")]
    Escape(PathBuf),
    #[error("git clone failed: {0}")]
    CloneFailed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A prepared workspace: its root and the working directory handed to
/// workers.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    pub root: PathBuf,
    pub workdir: PathBuf,
}

#[derive(Debug)]
pub struct WorkspaceManager {
    root: PathBuf,
    aliases: HashMap<String, PathBuf>,
    allow_absolute: bool,
}

impl WorkspaceManager {
    pub fn new(settings: &Settings) -> Result<Self, WorkspaceError> {
        fs::create_dir_all(&settings.workspaces_root)?;
        Ok(Self {
            root: settings.workspaces_root.canonicalize()?,
            aliases: settings.project_aliases.clone(),
            allow_absolute: settings.allow_absolute_workdir,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a spec `workdir` into a source directory to materialize.
    ///
    /// `"."` (or empty) means a fresh empty workspace; an absolute path
    /// is honored only when the config escape hatch is open; anything
    /// else must be a configured project alias.
    pub fn resolve_source(&self, workdir: &str) -> Result<Option<PathBuf>, WorkspaceError> {
        let trimmed = workdir.trim();
        if trimmed.is_empty() || trimmed == "." {
            return Ok(None);
        }
        let path = Path::new(trimmed);
        if path.is_absolute() {
            if !self.allow_absolute {
                return Err(WorkspaceError::AbsoluteWorkdirForbidden);
            }
            if !path.is_dir() {
                return Err(WorkspaceError::MissingSource(path.to_path_buf()));
            }
            return Ok(Some(path.to_path_buf()));
        }
        match self.aliases.get(trimmed) {
            Some(alias_path) if alias_path.is_dir() => Ok(Some(alias_path.clone())),
            Some(alias_path) => Err(WorkspaceError::MissingSource(alias_path.clone())),
            None => Err(WorkspaceError::UnknownProject(trimmed.to_string())),
        }
    }

    /// Create (or re-enter) the workspace for a job and materialize the
    /// source into `work/`.
    ///
    /// A non-empty existing `work/` is reused as-is: that is the resume
    /// path after an `approve`, where the job's working copy must carry
    /// over.
    pub async fn prepare(
        &self,
        job_id: &str,
        source: Option<&Path>,
    ) -> Result<WorkspaceLayout, WorkspaceError> {
        if job_id.is_empty()
            || job_id.contains('/')
            || job_id.contains('\\')
            || job_id.contains("..")
        {
            return Err(WorkspaceError::InvalidJobId(job_id.to_string()));
        }

        let root = self.root.join(job_id);
        let workdir = root.join("work");
        self.assert_no_symlink_components(&root)?;
        fs::create_dir_all(&root)?;
        self.assert_no_symlink_components(&workdir)?;

        let already_materialized = workdir.is_dir() && fs::read_dir(&workdir)?.next().is_some();
        if !already_materialized {
            match source {
                None => fs::create_dir_all(&workdir)?,
                Some(src) => {
                    let src = src
                        .canonicalize()
                        .map_err(|_| WorkspaceError::MissingSource(src.to_path_buf()))?;
                    if !src.is_dir() {
                        return Err(WorkspaceError::MissingSource(src));
                    }
                    self.materialize(&src, &workdir).await?;
                }
            }
        }

        let final_workdir = workdir.canonicalize()?;
        if !final_workdir.starts_with(&self.root) {
            return Err(WorkspaceError::Escape(final_workdir));
        }
        Ok(WorkspaceLayout {
            root,
            workdir: final_workdir,
        })
    }

    async fn materialize(&self, src: &Path, workdir: &Path) -> Result<(), WorkspaceError> {
        if src.join(".git").exists() {
            let src_str = src.to_string_lossy().into_owned();
            let dst_str = workdir.to_string_lossy().into_owned();
            let cmd = command_in(
                src,
                "git",
                &["clone", "--local", "--quiet", &src_str, &dst_str],
            );
            let output = run_with_timeout(cmd, GIT_TIMEOUT, "git clone")
                .await
                .map_err(WorkspaceError::CloneFailed)?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(WorkspaceError::CloneFailed(stderr.trim().to_string()));
            }
            return Ok(());
        }
        copy_tree(src, workdir)
    }

    /// Walk each component below the workspaces root and refuse
    /// symlinks; a later canonicalize check alone would race against
    /// link swaps mid-materialization.
    fn assert_no_symlink_components(&self, target: &Path) -> Result<(), WorkspaceError> {
        let relative = target
            .strip_prefix(&self.root)
            .map_err(|_| WorkspaceError::Escape(target.to_path_buf()))?;
        let mut cursor = self.root.clone();
        for part in relative.components() {
            cursor.push(part);
            if cursor.is_symlink() {
                return Err(WorkspaceError::SymlinkRejected(cursor));
            }
        }
        Ok(())
    }
}

/// Recursive copy that refuses symlinks anywhere in the source.
fn copy_tree(src: &Path, dst: &Path) -> Result<(), WorkspaceError> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        if from.is_symlink() {
            return Err(WorkspaceError::SymlinkRejected(from));
        }
        let to = dst.join(entry.file_name());
        if from.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
