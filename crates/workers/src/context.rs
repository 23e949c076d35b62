// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-step execution context handed to a worker.

use gantry_core::{ExecutionPolicy, JobSpec, Redactor, StepSpec, StepStatus};
use gantry_storage::artifacts::atomic_write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative cancellation flag shared between the runner and a worker.
///
/// The runner flips it on timeout or shutdown; a worker must poll it
/// between long operations and wind down within a bounded grace period.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Everything a worker may see and touch while executing one step.
///
/// `step_dir` is the only writable root; the runner treats any write
/// outside it as a step failure.
#[derive(Clone)]
pub struct StepContext {
    pub job: Arc<JobSpec>,
    pub step: StepSpec,
    pub policy: ExecutionPolicy,
    /// `artifacts/<job_id>/` (read-only for workers).
    pub job_dir: PathBuf,
    /// `artifacts/<job_id>/steps/<step_id>/` (the writable root).
    pub step_dir: PathBuf,
    /// The per-job working copy of the target repository.
    pub workspace_dir: PathBuf,
    pub enable_real_cli: bool,
    /// Effective wall-clock deadline for this attempt (spec value or
    /// config default, resolved by the runner).
    pub step_timeout: Duration,
    /// Kill a subprocess that stays silent this long.
    pub idle_timeout: Option<Duration>,
    pub max_output_chars: usize,
    /// Step status to report when a CLI step lands on a non-git
    /// workspace.
    pub non_git_workdir_status: StepStatus,
    pub redactor: Arc<Redactor>,
    pub cancel: CancelHandle,
}

impl StepContext {
    /// Atomically write the three contract files, redacted.
    pub fn write_step_files(
        &self,
        report_md: &str,
        patch_diff: &str,
        logs_txt: &str,
    ) -> std::io::Result<()> {
        self.write_file("report.md", report_md)?;
        self.write_file("patch.diff", patch_diff)?;
        self.write_file("logs.txt", logs_txt)
    }

    /// Persist raw subprocess captures when non-empty, redacted.
    pub fn write_raw_capture(&self, stdout: &str, stderr: &str) -> std::io::Result<()> {
        if !stdout.is_empty() {
            self.write_file("raw_stdout.txt", stdout)?;
        }
        if !stderr.is_empty() {
            self.write_file("raw_stderr.txt", stderr)?;
        }
        Ok(())
    }

    fn write_file(&self, name: &str, text: &str) -> std::io::Result<()> {
        let redacted = self.redactor.redact(text);
        atomic_write(&self.step_dir.join(name), redacted.as_bytes())
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
