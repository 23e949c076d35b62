// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path-safe, atomic writes under `artifacts/<job_id>/`.
//!
//! Every target path is validated to stay strictly inside the job's
//! artifact root before any file is created, so a traversal attempt
//! leaves no partial file behind. Writes go to a temp file in the final
//! directory, are fsynced, then renamed into place.
//!
//! Fixed layout:
//!
//! ```text
//! artifacts/<job_id>/
//!   job.json  state.json  result.json  context.json
//!   report.md  patch.diff  logs.txt
//!   steps/<step_id>/
//!     result.json  report.md  patch.diff  logs.txt
//!     raw_stdout.txt?  raw_stderr.txt?
//! ```

use gantry_core::{validate_job_id, JobResult, JobSpec, JobState, StepResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Files a worker must leave behind in its step directory.
pub const STEP_CONTRACT_FILES: [&str; 3] = ["report.md", "patch.diff", "logs.txt"];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("path '{0}' escapes the artifact root")]
    PathTraversal(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("json {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Resolve `rel` under `base`, refusing anything that would land outside.
///
/// Normalization is lexical (`.` dropped, `..` popped, never past the
/// base); when the candidate or its parent already exists, symlinks are
/// resolved and containment is re-checked against the canonical base.
pub fn resolve_under(base: &Path, rel: &str) -> Result<PathBuf, StoreError> {
    let rel_path = Path::new(rel);
    if rel.is_empty() || rel_path.is_absolute() {
        return Err(StoreError::PathTraversal(rel.to_string()));
    }

    let mut normalized = PathBuf::new();
    for comp in rel_path.components() {
        match comp {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(StoreError::PathTraversal(rel.to_string()));
                }
            }
            _ => return Err(StoreError::PathTraversal(rel.to_string())),
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(StoreError::PathTraversal(rel.to_string()));
    }

    let candidate = base.join(&normalized);

    // Symlink defense: check the deepest existing ancestor against the
    // canonical base.
    if let Ok(canonical_base) = base.canonicalize() {
        let mut probe = candidate.clone();
        let existing = loop {
            if probe.exists() {
                break Some(probe.clone());
            }
            if !probe.pop() || !probe.starts_with(base) {
                break None;
            }
        };
        if let Some(existing) = existing {
            let resolved = existing.canonicalize()?;
            if !resolved.starts_with(&canonical_base) {
                return Err(StoreError::PathTraversal(rel.to_string()));
            }
        }
    }

    Ok(candidate)
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `artifacts/<job_id>/`; the id itself is validated against
    /// separators and leading dots.
    pub fn job_dir(&self, job_id: &str) -> Result<PathBuf, StoreError> {
        validate_job_id(job_id)
            .map_err(|_| StoreError::PathTraversal(job_id.to_string()))?;
        Ok(self.root.join(job_id))
    }

    pub fn step_dir(&self, job_id: &str, step_id: &str) -> Result<PathBuf, StoreError> {
        let job_dir = self.job_dir(job_id)?;
        resolve_under(&job_dir, &format!("steps/{step_id}"))
    }

    pub fn ensure_job_layout(&self, job_id: &str) -> Result<(), StoreError> {
        let dir = self.job_dir(job_id)?.join("steps");
        create_dirs(&dir)?;
        Ok(())
    }

    pub fn ensure_step_layout(&self, job_id: &str, step_id: &str) -> Result<PathBuf, StoreError> {
        let dir = self.step_dir(job_id, step_id)?;
        create_dirs(&dir)?;
        Ok(dir)
    }

    /// Atomically write text at a path relative to the job root.
    pub fn write_text(&self, job_id: &str, rel: &str, text: &str) -> Result<(), StoreError> {
        let job_dir = self.job_dir(job_id)?;
        let target = resolve_under(&job_dir, rel)?;
        atomic_write(&target, text.as_bytes())?;
        Ok(())
    }

    /// Atomically write a JSON document at a path relative to the job
    /// root. Key order follows the struct definition, so byte output is
    /// deterministic for a given value.
    pub fn write_json<T: Serialize>(
        &self,
        job_id: &str,
        rel: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let job_dir = self.job_dir(job_id)?;
        let target = resolve_under(&job_dir, rel)?;
        let mut body = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
            path: target.clone(),
            source,
        })?;
        body.push('\n');
        atomic_write(&target, body.as_bytes())?;
        Ok(())
    }

    pub fn write_job_spec(&self, spec: &JobSpec) -> Result<(), StoreError> {
        self.write_json(&spec.job_id, "job.json", spec)
    }

    pub fn write_state(&self, state: &JobState) -> Result<(), StoreError> {
        self.write_json(&state.job_id, "state.json", state)
    }

    pub fn write_context(&self, job_id: &str, context: &serde_json::Value) -> Result<(), StoreError> {
        self.write_json(job_id, "context.json", context)
    }

    pub fn write_step_result(&self, result: &StepResult) -> Result<(), StoreError> {
        self.write_json(
            &result.job_id,
            &format!("steps/{}/result.json", result.step_id),
            result,
        )
    }

    /// Aggregate job artifacts: `report.md`, `patch.diff`, `logs.txt`
    /// plus the job `result.json`.
    pub fn write_job_artifacts(
        &self,
        result: &JobResult,
        report_md: &str,
        patch_diff: &str,
        logs_txt: &str,
    ) -> Result<(), StoreError> {
        self.write_text(&result.job_id, "report.md", report_md)?;
        self.write_text(&result.job_id, "patch.diff", patch_diff)?;
        self.write_text(&result.job_id, "logs.txt", logs_txt)?;
        self.write_json(&result.job_id, "result.json", result)
    }

    pub fn read_text(&self, job_id: &str, rel: &str) -> Result<Option<String>, StoreError> {
        let job_dir = self.job_dir(job_id)?;
        let path = resolve_under(&job_dir, rel)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_state(&self, job_id: &str) -> Result<Option<JobState>, StoreError> {
        self.read_json(job_id, "state.json")
    }

    pub fn read_result(&self, job_id: &str) -> Result<Option<JobResult>, StoreError> {
        self.read_json(job_id, "result.json")
    }

    pub fn read_step_result(
        &self,
        job_id: &str,
        step_id: &str,
    ) -> Result<Option<StepResult>, StoreError> {
        self.read_json(job_id, &format!("steps/{step_id}/result.json"))
    }

    fn read_json<T: DeserializeOwned>(
        &self,
        job_id: &str,
        rel: &str,
    ) -> Result<Option<T>, StoreError> {
        let Some(body) = self.read_text(job_id, rel)? else {
            return Ok(None);
        };
        let job_dir = self.job_dir(job_id)?;
        let parsed = serde_json::from_str(&body).map_err(|source| StoreError::Json {
            path: job_dir.join(rel),
            source,
        })?;
        Ok(Some(parsed))
    }

    /// Contract files the worker failed to write for a step.
    pub fn missing_step_files(
        &self,
        job_id: &str,
        step_id: &str,
    ) -> Result<Vec<&'static str>, StoreError> {
        let dir = self.step_dir(job_id, step_id)?;
        Ok(STEP_CONTRACT_FILES
            .iter()
            .copied()
            .filter(|name| !dir.join(name).is_file())
            .collect())
    }
}

fn create_dirs(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(dir, fs::Permissions::from_mode(0o755));
    }
    Ok(())
}

/// Write-temp-then-rename within the target directory.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other("path has no parent"))?;
    create_dirs(parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{file_name}.{}.tmp", std::process::id()));
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
