// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step and job results as persisted in `result.json` files.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Machine-readable failure classification carried as `error.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ValidationError,
    DuplicateJob,
    QueueEmpty,
    WorkerNotFound,
    WorkerContractViolation,
    Timeout,
    BudgetExceeded,
    SubprocessExitNonzero,
    PolicyViolation,
    PathTraversal,
    TransientIo,
    StepTransitionLimit,
    RunnerShutdown,
    PreflightFailed,
    PatchApplyFailed,
    WorkspaceError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::DuplicateJob => "duplicate_job",
            ErrorCode::QueueEmpty => "queue_empty",
            ErrorCode::WorkerNotFound => "worker_not_found",
            ErrorCode::WorkerContractViolation => "worker_contract_violation",
            ErrorCode::Timeout => "timeout",
            ErrorCode::BudgetExceeded => "budget_exceeded",
            ErrorCode::SubprocessExitNonzero => "subprocess_exit_nonzero",
            ErrorCode::PolicyViolation => "policy_violation",
            ErrorCode::PathTraversal => "path_traversal",
            ErrorCode::TransientIo => "transient_io",
            ErrorCode::StepTransitionLimit => "step_transition_limit",
            ErrorCode::RunnerShutdown => "runner_shutdown",
            ErrorCode::PreflightFailed => "preflight_failed",
            ErrorCode::PatchApplyFailed => "patch_apply_failed",
            ErrorCode::WorkspaceError => "workspace_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure detail attached to a [`StepResult`] or [`JobResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Whether the failed attempt may be retried.
    ///
    /// Timeouts and transient I/O are always retriable; a nonzero
    /// subprocess exit only when the worker marked it so in `details`.
    pub fn is_retriable(&self) -> bool {
        match self.code {
            ErrorCode::Timeout | ErrorCode::TransientIo => true,
            ErrorCode::SubprocessExitNonzero => {
                self.details.get("retriable").and_then(Value::as_bool) == Some(true)
            }
            _ => false,
        }
    }
}

/// Discriminates step results from job results on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Step,
    Job,
}

/// Terminal status of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Failed,
    NeedsHuman,
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Ok => write!(f, "ok"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::NeedsHuman => write!(f, "needs_human"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Terminal status of a whole job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Ok,
    Failed,
    NeedsHuman,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Ok => write!(f, "ok"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::NeedsHuman => write!(f, "needs_human"),
        }
    }
}

/// Worker-reported usage numbers, consumed by the budget gate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_out: Option<u64>,
}

/// The fixed artifact set every step produces, relative to
/// `artifacts/<job_id>/`.
pub fn standard_step_artifacts(step_id: &str) -> Vec<String> {
    ["report.md", "patch.diff", "logs.txt", "result.json"]
        .iter()
        .map(|name| format!("steps/{step_id}/{name}"))
        .collect()
}

/// Outcome of one step, persisted as `steps/<step_id>/result.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub kind: ResultKind,
    pub job_id: String,
    pub step_id: String,
    pub agent: String,
    #[serde(default)]
    pub role: String,
    pub status: StepStatus,
    pub attempts: u32,
    pub started_at: String,
    pub ended_at: String,
    /// `null` unless `status` is a failure.
    pub error: Option<ErrorInfo>,
    /// Relative paths of files written; always includes the standard four.
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub metrics: Metrics,
}

impl StepResult {
    /// A result shell with the standard artifact set; callers fill in
    /// status-specific fields.
    pub fn new(
        job_id: impl Into<String>,
        step_id: impl Into<String>,
        agent: impl Into<String>,
        role: impl Into<String>,
        status: StepStatus,
        started_at: impl Into<String>,
        ended_at: impl Into<String>,
    ) -> Self {
        let step_id = step_id.into();
        let artifacts = standard_step_artifacts(&step_id);
        Self {
            kind: ResultKind::Step,
            job_id: job_id.into(),
            step_id,
            agent: agent.into(),
            role: role.into(),
            status,
            attempts: 1,
            started_at: started_at.into(),
            ended_at: ended_at.into(),
            error: None,
            artifacts,
            metrics: Metrics::default(),
        }
    }

    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

/// Aggregated outcome of a job, persisted as `result.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub kind: ResultKind,
    pub job_id: String,
    pub status: JobStatus,
    pub started_at: String,
    pub ended_at: String,
    #[serde(default)]
    pub duration_ms: u64,
    /// The first fatal error, when `status` is not ok.
    pub error: Option<ErrorInfo>,
    /// Step results in execution order (not definition order).
    pub steps: Vec<StepResult>,
}

#[cfg(test)]
#[path = "result_tests.rs"]
mod tests;
