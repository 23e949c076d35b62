// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mutable per-job operational state (`state.json`).
//!
//! The queue file itself is immutable after enqueue; everything that
//! changes while a job runs lives here. The runner rewrites the file
//! atomically after every step and bumps `revision` on each write so
//! readers can detect progress.

use crate::result::ErrorInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Job-level phase mirrored into `state.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Running,
    Ok,
    Failed,
    NeedsHuman,
}

/// Step-level phase, including the transient in-flight states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    #[default]
    Pending,
    Running,
    Retrying,
    Ok,
    Failed,
    NeedsHuman,
    Skipped,
}

impl StepPhase {
    /// Whether the step reached a final status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepPhase::Ok | StepPhase::Failed | StepPhase::NeedsHuman | StepPhase::Skipped
        )
    }
}

/// Per-step record inside [`JobState`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepState {
    pub status: StepPhase,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorInfo>,
    #[serde(default)]
    pub last_updated: String,
}

/// Contents of `artifacts/<job_id>/state.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: String,
    /// Monotonically increasing write counter.
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub status: RunPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    /// Keyed by step_id. A BTreeMap keeps serialization deterministic;
    /// execution order is recoverable from the job result.
    #[serde(default)]
    pub steps: BTreeMap<String, StepState>,
}

impl JobState {
    pub fn new(job_id: impl Into<String>, started_at: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            revision: 0,
            status: RunPhase::Running,
            current_step: None,
            started_at: started_at.into(),
            ended_at: None,
            steps: BTreeMap::new(),
        }
    }

    /// Bump the revision counter; call once per write.
    pub fn advance_revision(&mut self) {
        self.revision += 1;
    }

    /// Record a step phase change.
    pub fn record_step(
        &mut self,
        step_id: &str,
        status: StepPhase,
        attempts: u32,
        last_error: Option<ErrorInfo>,
        now: &str,
    ) {
        let entry = self.steps.entry(step_id.to_string()).or_default();
        entry.status = status;
        entry.attempts = attempts;
        entry.last_error = last_error;
        entry.last_updated = now.to_string();
    }

    /// Recorded phase of a step, if any.
    pub fn step_phase(&self, step_id: &str) -> Option<StepPhase> {
        self.steps.get(step_id).map(|s| s.status)
    }

    /// Close the job out with a final phase.
    pub fn finish(&mut self, status: RunPhase, ended_at: &str) {
        self.status = status;
        self.current_step = None;
        self.ended_at = Some(ended_at.to_string());
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
