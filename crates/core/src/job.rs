// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job and step specifications.
//!
//! A [`JobSpec`] is the durable input contract: it is what producers write
//! into the queue and what the runner executes. Unknown fields are rejected
//! at deserialization time so malformed payloads fail at enqueue, not
//! mid-run.

use crate::policy::PolicySpec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path};
use thiserror::Error;

/// Errors raised when a spec fails semantic validation at enqueue time.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("job_id must not be empty")]
    EmptyJobId,
    #[error("job_id '{0}' contains a path separator")]
    JobIdPathSeparator(String),
    #[error("job_id '{0}' must not start with '.'")]
    JobIdLeadingDot(String),
    #[error("job must declare at least one step")]
    NoSteps,
    #[error("step_id '{0}' contains characters outside [A-Za-z0-9_-]")]
    UnsafeStepId(String),
    #[error("duplicate step_id '{0}'")]
    DuplicateStepId(String),
    #[error("step '{0}' has an empty agent name")]
    EmptyAgent(String),
    #[error("step '{step_id}': on_failure goto target '{target}' does not exist")]
    GotoTargetMissing { step_id: String, target: String },
    #[error("step '{step_id}': artifact path '{path}' is not a relative path inside the job")]
    BadArtifactPath { step_id: String, path: String },
    #[error("unknown on_failure directive '{0}'")]
    UnknownOnFailure(String),
}

/// Validate a job identifier for use as a queue file stem.
///
/// Any character is allowed except path separators; the first character
/// must not be `.` so ids never collide with hidden/temp files.
pub fn validate_job_id(job_id: &str) -> Result<(), ValidationError> {
    if job_id.is_empty() {
        return Err(ValidationError::EmptyJobId);
    }
    if job_id.contains('/') || job_id.contains('\\') {
        return Err(ValidationError::JobIdPathSeparator(job_id.to_string()));
    }
    if job_id.starts_with('.') {
        return Err(ValidationError::JobIdLeadingDot(job_id.to_string()));
    }
    Ok(())
}

fn is_safe_step_id(step_id: &str) -> bool {
    !step_id.is_empty()
        && step_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// A relative path is acceptable as an artifact reference when it stays
/// inside the job's artifact root under lexical normalization.
fn is_safe_artifact_path(path: &str) -> bool {
    let p = Path::new(path);
    if path.is_empty() || p.is_absolute() {
        return false;
    }
    let mut depth: i32 = 0;
    for comp in p.components() {
        match comp {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => return false,
        }
    }
    depth > 0
}

/// What to do when a step exhausts its retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OnFailure {
    /// Terminate the job as failed (default).
    #[default]
    Stop,
    /// Record the failure and move to the next step.
    Continue,
    /// Park the job in `awaiting_approval/` for an operator.
    AskHuman,
    /// Reposition the cursor at the named step.
    Goto(String),
}

impl TryFrom<String> for OnFailure {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "stop" => Ok(OnFailure::Stop),
            "continue" => Ok(OnFailure::Continue),
            "ask_human" => Ok(OnFailure::AskHuman),
            other => match other.strip_prefix("goto:") {
                Some(target) if !target.is_empty() => Ok(OnFailure::Goto(target.to_string())),
                _ => Err(ValidationError::UnknownOnFailure(value)),
            },
        }
    }
}

impl From<OnFailure> for String {
    fn from(value: OnFailure) -> Self {
        value.to_string()
    }
}

impl fmt::Display for OnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnFailure::Stop => write!(f, "stop"),
            OnFailure::Continue => write!(f, "continue"),
            OnFailure::AskHuman => write!(f, "ask_human"),
            OnFailure::Goto(target) => write!(f, "goto:{target}"),
        }
    }
}

/// One worker invocation inside a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepSpec {
    /// Unique per job; used as a directory name under `steps/`.
    pub step_id: String,
    /// Worker name resolved through the registry.
    pub agent: String,
    /// Free-text classifier (planner/implementer/reviewer/...), consumed
    /// only by workers.
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub prompt: String,
    /// Paths relative to `artifacts/<job_id>/` fed into the prompt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_artifacts: Vec<String>,
    /// Patches (relative to `artifacts/<job_id>/`) applied to the
    /// workspace before a CLI step runs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apply_patches_from: Vec<String>,
    /// Opaque tool allowlist passed through to the worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    /// Wall-clock deadline per attempt; config default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_sec: Option<u64>,
    /// Retry budget for transient failures; config default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub on_failure: OnFailure,
}

/// The input contract for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    pub job_id: String,
    pub goal: String,
    /// Source repository: a project alias resolved through the configured
    /// alias map, or an absolute path when that escape hatch is permitted.
    pub workdir: String,
    pub steps: Vec<StepSpec>,
    /// Per-job policy overrides, overlaid on config defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicySpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_strategy: Option<String>,
    /// Original cron expression, set only by the scheduler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

impl JobSpec {
    /// Semantic validation beyond what serde enforces.
    ///
    /// Checks the job id shape, step id uniqueness and safety, agent
    /// presence, artifact path containment and `goto` target existence.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_job_id(&self.job_id)?;
        if self.steps.is_empty() {
            return Err(ValidationError::NoSteps);
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            if !is_safe_step_id(&step.step_id) {
                return Err(ValidationError::UnsafeStepId(step.step_id.clone()));
            }
            if !seen.insert(step.step_id.as_str()) {
                return Err(ValidationError::DuplicateStepId(step.step_id.clone()));
            }
            if step.agent.trim().is_empty() {
                return Err(ValidationError::EmptyAgent(step.step_id.clone()));
            }
            for path in step.input_artifacts.iter().chain(&step.apply_patches_from) {
                if !is_safe_artifact_path(path) {
                    return Err(ValidationError::BadArtifactPath {
                        step_id: step.step_id.clone(),
                        path: path.clone(),
                    });
                }
            }
        }

        for step in &self.steps {
            if let OnFailure::Goto(target) = &step.on_failure {
                if !self.steps.iter().any(|s| &s.step_id == target) {
                    return Err(ValidationError::GotoTargetMissing {
                        step_id: step.step_id.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Position of a step in the definition order.
    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.step_id == step_id)
    }
}

/// Default plan → implement → review pipeline for a bare goal.
pub fn default_pipeline(goal: &str) -> Vec<StepSpec> {
    let step = |step_id: &str, agent: &str, role: &str, prompt: String| StepSpec {
        step_id: step_id.to_string(),
        agent: agent.to_string(),
        role: role.to_string(),
        prompt,
        input_artifacts: Vec::new(),
        apply_patches_from: Vec::new(),
        allowed_tools: None,
        timeout_sec: None,
        max_attempts: None,
        on_failure: OnFailure::Stop,
    };

    let mut plan = step(
        "01_plan",
        "opencode",
        "planner",
        format!("Draft an implementation plan for the task:\n{goal}"),
    );
    plan.timeout_sec = Some(120);

    let mut implement = step(
        "02_implement",
        "codex",
        "implementer",
        format!("Implement the task and prepare a patch:\n{goal}"),
    );
    implement.timeout_sec = Some(300);
    implement.input_artifacts = vec!["steps/01_plan/report.md".to_string()];

    let mut review = step(
        "03_review",
        "claude",
        "reviewer",
        format!("Review the changes and risks for the task:\n{goal}"),
    );
    review.timeout_sec = Some(180);
    review.input_artifacts = vec![
        "steps/01_plan/report.md".to_string(),
        "steps/02_implement/report.md".to_string(),
        "steps/02_implement/patch.diff".to_string(),
    ];

    vec![plan, implement, review]
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
