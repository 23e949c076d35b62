// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for worker tests.

use crate::context::{CancelHandle, StepContext};
use gantry_core::{
    ExecutionPolicy, JobSpec, NetworkPolicy, Redactor, StepSpec, StepStatus,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub(crate) fn test_policy() -> ExecutionPolicy {
    ExecutionPolicy {
        sandbox: false,
        sandbox_wrapper: None,
        sandbox_wrapper_args: Vec::new(),
        network_policy: NetworkPolicy::Allow,
        allowed_binaries: ["opencode", "codex", "claude", "git"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        env_allowlist: ["PATH", "HOME"].iter().map(|s| s.to_string()).collect(),
        sensitive_env_vars: Default::default(),
        sandbox_clear_env: false,
        max_input_artifacts_files: 10,
        max_input_artifact_chars: 12_000,
        max_input_artifacts_chars: 40_000,
    }
}

pub(crate) fn test_step(step_id: &str, agent: &str) -> StepSpec {
    StepSpec {
        step_id: step_id.to_string(),
        agent: agent.to_string(),
        role: "planner".to_string(),
        prompt: "do the thing".to_string(),
        input_artifacts: Vec::new(),
        apply_patches_from: Vec::new(),
        allowed_tools: None,
        timeout_sec: None,
        max_attempts: None,
        on_failure: Default::default(),
    }
}

pub(crate) fn test_job(job_id: &str, steps: Vec<StepSpec>) -> JobSpec {
    JobSpec {
        job_id: job_id.to_string(),
        goal: "demo goal".to_string(),
        workdir: ".".to_string(),
        steps,
        policy: None,
        context_window: None,
        context_strategy: None,
        schedule: None,
    }
}

/// A simulation-mode context rooted in `base`, for job `job_id` and a
/// single step `step_id` driven by the opencode agent.
pub(crate) fn test_context(base: &Path, job_id: &str, step_id: &str) -> StepContext {
    let step = test_step(step_id, "opencode");
    let job = test_job(job_id, vec![step.clone()]);
    let job_dir = base.join("artifacts").join(job_id);
    StepContext {
        job: Arc::new(job),
        step,
        policy: test_policy(),
        step_dir: job_dir.join("steps").join(step_id),
        job_dir,
        workspace_dir: base.join("workspaces").join(job_id).join("work"),
        enable_real_cli: false,
        step_timeout: Duration::from_secs(600),
        idle_timeout: None,
        max_output_chars: 200_000,
        non_git_workdir_status: StepStatus::NeedsHuman,
        redactor: Arc::new(Redactor::default()),
        cancel: CancelHandle::new(),
    }
}
