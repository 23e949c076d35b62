// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gantry-core: Data model for the Gantry orchestrator.
//!
//! Specs, results, per-job state, execution policy and log redaction.
//! This crate performs no I/O; everything here is plain data shared by
//! the queue, the artifact store, the workers and the runner.

pub mod job;
pub mod policy;
pub mod redact;
pub mod result;
pub mod state;
pub mod time_fmt;

pub use job::{default_pipeline, validate_job_id, JobSpec, OnFailure, StepSpec, ValidationError};
pub use policy::{ExecutionPolicy, NetworkPolicy, PolicyError, PolicySpec};
pub use redact::Redactor;
pub use result::{
    standard_step_artifacts, ErrorCode, ErrorInfo, JobResult, JobStatus, Metrics, ResultKind,
    StepResult, StepStatus,
};
pub use state::{JobState, RunPhase, StepPhase, StepState};
pub use time_fmt::utc_now_iso;
