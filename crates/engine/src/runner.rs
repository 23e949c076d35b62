// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job runner: claim, execute step by step, aggregate, complete.
//!
//! One cooperative loop per process; any number of processes may share
//! the queue. Runtime errors become step results, never loop exits. On
//! SIGTERM the runner drains: the in-flight attempt gets a grace window
//! to finish, state is persisted, and an unfinished job is left in
//! `running/` for another runner's reclaim pass.

use crate::config::Settings;
use crate::workspace::{WorkspaceError, WorkspaceManager};
use gantry_core::{
    utc_now_iso, ErrorCode, ErrorInfo, ExecutionPolicy, JobResult, JobSpec, JobState, JobStatus,
    OnFailure, Redactor, ResultKind, RunPhase, StepPhase, StepResult, StepSpec, StepStatus,
};
use gantry_queue::{ClaimedJob, FileQueue, JobFolder, QueueError, Terminal};
use gantry_storage::{run_retention, ArtifactStore, BudgetError, BudgetGate, StoreError};
use gantry_workers::{CancelHandle, StepContext, WorkerError, WorkerRegistry};
use serde_json::json;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Budget(#[from] BudgetError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// How the step cursor should move after a step's final attempt.
enum CursorMove {
    Advance,
    Goto(usize),
    StopFailed(ErrorInfo),
    AskHuman,
    Shutdown(ErrorInfo),
}

pub struct Runner {
    settings: Settings,
    queue: FileQueue,
    store: ArtifactStore,
    workspaces: WorkspaceManager,
    budget: BudgetGate,
    registry: WorkerRegistry,
    base_policy: ExecutionPolicy,
    redactor: Arc<Redactor>,
    shutdown: Arc<AtomicBool>,
}

impl Runner {
    pub fn new(settings: Settings, registry: WorkerRegistry) -> Result<Self, RunnerError> {
        let queue = FileQueue::new(&settings.queue_root)?;
        let store = ArtifactStore::new(&settings.artifacts_root);
        let workspaces = WorkspaceManager::new(&settings)?;
        let budget = BudgetGate::open(
            &settings.state_db_path,
            settings.max_daily_api_calls,
            settings.max_daily_cost_usd,
        )?;
        let base_policy = settings.base_policy();
        let redactor = Arc::new(Redactor::from_env(&settings.sensitive_env_vars));
        Ok(Self {
            settings,
            queue,
            store,
            workspaces,
            budget,
            registry,
            base_policy,
            redactor,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag polled by the loop; flip it from a signal handler to drain.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn queue(&self) -> &FileQueue {
        &self.queue
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Main loop: maintenance, claim, execute, sleep when idle.
    pub async fn run_forever(&self) -> Result<(), RunnerError> {
        info!(
            enable_real_cli = self.settings.enable_real_cli,
            sandbox = self.settings.sandbox,
            "runner started"
        );
        if self.settings.enable_real_cli {
            if let Err(e) = self.base_policy.assert_real_cli_safe() {
                warn!(error = %e, "policy will reject real CLI jobs until fixed");
            }
        }

        let mut next_retention = Instant::now();
        let poll = Duration::from_secs(self.settings.runner_poll_interval_sec.max(1));

        while !self.shutting_down() {
            if let Err(e) = self.maintenance(&mut next_retention) {
                error!(error = %e, "maintenance pass failed");
            }
            match self.run_once().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(poll).await,
                Err(e) => {
                    error!(error = %e, "job execution failed unexpectedly");
                    tokio::time::sleep(poll).await;
                }
            }
        }
        info!("runner drained, exiting");
        Ok(())
    }

    /// Claim and execute at most one job. Returns whether one ran.
    pub async fn run_once(&self) -> Result<bool, RunnerError> {
        let claimed = match self.queue.claim() {
            Ok(claimed) => claimed,
            Err(QueueError::Empty) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        self.execute_job(claimed).await?;
        Ok(true)
    }

    /// Reclaim stale claims and run the retention sweep on its interval.
    pub fn maintenance(&self, next_retention: &mut Instant) -> Result<(), RunnerError> {
        let outcome = self.queue.reclaim_stale_running(
            Duration::from_secs(self.settings.runner_reclaim_after_sec),
            self.settings.max_reclaim_attempts,
        )?;
        if !outcome.requeued.is_empty() {
            warn!(jobs = ?outcome.requeued, "reclaimed stale running jobs back to pending");
        }
        for job_id in &outcome.exhausted {
            warn!(job_id = %job_id, "reclaim budget exhausted, job failed");
            let error = ErrorInfo::new(
                ErrorCode::RunnerShutdown,
                "job was reclaimed too many times; the owning runner keeps dying",
            );
            if let Err(e) = self.write_job_failure(job_id, None, error) {
                warn!(job_id = %job_id, error = %e, "could not write failure artifacts");
            }
        }

        if self.settings.retention_interval_sec > 0 && Instant::now() >= *next_retention {
            let protected = self.protected_job_ids()?;
            let stats = run_retention(
                &self.settings.artifacts_root,
                &self.settings.workspaces_root,
                Duration::from_secs(self.settings.artifacts_ttl_sec),
                Duration::from_secs(self.settings.workspaces_ttl_sec),
                &protected,
            );
            if stats.removed_artifacts > 0 || stats.removed_workspaces > 0 {
                info!(
                    artifacts = stats.removed_artifacts,
                    workspaces = stats.removed_workspaces,
                    "retention removed expired trees"
                );
            }
            *next_retention =
                Instant::now() + Duration::from_secs(self.settings.retention_interval_sec);
        }
        Ok(())
    }

    fn protected_job_ids(&self) -> Result<HashSet<String>, RunnerError> {
        let mut protected = HashSet::new();
        for folder in [
            JobFolder::Pending,
            JobFolder::Running,
            JobFolder::AwaitingApproval,
        ] {
            protected.extend(self.queue.list_job_ids(folder)?);
        }
        Ok(protected)
    }

    async fn execute_job(&self, claimed: ClaimedJob) -> Result<(), RunnerError> {
        let job_id = claimed.job_id.clone();
        let spec = Arc::new(claimed.spec);
        info!(job_id = %job_id, steps = spec.steps.len(), "job claimed");

        if let Err(validation) = spec.validate() {
            let error = ErrorInfo::new(ErrorCode::ValidationError, validation.to_string());
            // A path-unsafe job_id cannot even get an artifact dir; the
            // queue move below still parks the job in failed/.
            if let Err(e) = self.write_job_failure(&job_id, Some(&spec), error) {
                warn!(job_id = %job_id, error = %e, "could not write failure artifacts");
            }
            self.queue.complete(&job_id, Terminal::Failed)?;
            return Ok(());
        }

        // Workspace: resolve the source and materialize the working copy.
        let source = match self.workspaces.resolve_source(&spec.workdir) {
            Ok(source) => source,
            Err(e) => {
                let code = match e {
                    WorkspaceError::UnknownProject(_)
                    | WorkspaceError::AbsoluteWorkdirForbidden => ErrorCode::ValidationError,
                    _ => ErrorCode::WorkspaceError,
                };
                self.write_job_failure(&job_id, Some(&spec), ErrorInfo::new(code, e.to_string()))?;
                self.queue.complete(&job_id, Terminal::Failed)?;
                return Ok(());
            }
        };
        let workspace = match self.workspaces.prepare(&job_id, source.as_deref()).await {
            Ok(layout) => layout,
            Err(e) => {
                let error = ErrorInfo::new(ErrorCode::WorkspaceError, e.to_string());
                self.write_job_failure(&job_id, Some(&spec), error)?;
                self.queue.complete(&job_id, Terminal::Failed)?;
                return Ok(());
            }
        };

        self.store.ensure_job_layout(&job_id)?;
        self.store.write_job_spec(&spec)?;
        self.store.write_context(
            &job_id,
            &json!({
                "context_window": spec.context_window,
                "context_strategy": spec.context_strategy,
            }),
        )?;

        // Open or resume operational state.
        let started_at = utc_now_iso();
        let mut state = match self.store.read_state(&job_id)? {
            Some(mut prior) => {
                prior.status = RunPhase::Running;
                prior.ended_at = None;
                prior
            }
            None => JobState::new(&job_id, &started_at),
        };
        let job_started_at = state.started_at.clone();
        self.write_state(&mut state)?;

        // Effective policy; a real-CLI-unsafe policy fails the job before
        // any step runs.
        let policy = self.base_policy.for_job(spec.policy.as_ref());
        if self.settings.enable_real_cli {
            if let Err(e) = policy.assert_real_cli_safe() {
                let error = ErrorInfo::new(ErrorCode::PolicyViolation, e.to_string());
                self.finish_job(
                    &spec,
                    &mut state,
                    Vec::new(),
                    &job_started_at,
                    JobStatus::Failed,
                    Some(error),
                    Terminal::Failed,
                )?;
                return Ok(());
            }
        }

        let (mut executed, start_idx) = self.resume_position(&state, &spec)?;
        let mut cursor = start_idx;
        let mut transitions: u32 = 0;
        let mut end: Option<(JobStatus, Option<ErrorInfo>, Terminal)> = None;

        while cursor < spec.steps.len() {
            transitions += 1;
            if transitions > self.settings.step_transition_limit {
                let error = ErrorInfo::new(
                    ErrorCode::StepTransitionLimit,
                    format!(
                        "job exceeded the transition budget of {}",
                        self.settings.step_transition_limit
                    ),
                );
                end = Some((JobStatus::Failed, Some(error), Terminal::Failed));
                break;
            }

            let step = spec.steps[cursor].clone();
            let (result, cursor_move) = self
                .run_step(&spec, &step, &policy, &workspace.workdir, &mut state)
                .await?;
            self.store.write_step_result(&result)?;
            executed.push(result);

            match cursor_move {
                CursorMove::Advance => cursor += 1,
                CursorMove::Goto(idx) => cursor = idx,
                CursorMove::StopFailed(error) => {
                    end = Some((JobStatus::Failed, Some(error), Terminal::Failed));
                    break;
                }
                CursorMove::AskHuman => {
                    end = Some((JobStatus::NeedsHuman, None, Terminal::AwaitingApproval));
                    break;
                }
                CursorMove::Shutdown(error) => {
                    end = Some((JobStatus::Failed, Some(error), Terminal::Failed));
                    break;
                }
            }

            // Drain: the attempt above completed; leave the rest of the
            // job in running/ for a reclaim pass to pick up.
            if self.shutting_down() && cursor < spec.steps.len() && end.is_none() {
                self.write_state(&mut state)?;
                info!(job_id = %job_id, "shutdown drain, job left in running/");
                return Ok(());
            }
        }

        let (status, job_error, terminal) = end.unwrap_or_else(|| {
            let first_failure = executed
                .iter()
                .find(|r| r.status == StepStatus::Failed)
                .and_then(|r| r.error.clone());
            match first_failure {
                Some(error) => (JobStatus::Failed, Some(error), Terminal::Failed),
                None => (JobStatus::Ok, None, Terminal::Done),
            }
        });

        self.finish_job(
            &spec,
            &mut state,
            executed,
            &job_started_at,
            status,
            job_error,
            terminal,
        )?;
        Ok(())
    }

    /// Execute one step through retries; returns the final result and
    /// the cursor move it implies.
    async fn run_step(
        &self,
        spec: &Arc<JobSpec>,
        step: &StepSpec,
        policy: &ExecutionPolicy,
        workdir: &std::path::Path,
        state: &mut JobState,
    ) -> Result<(StepResult, CursorMove), RunnerError> {
        let job_id = spec.job_id.clone();
        let step_dir = self.store.ensure_step_layout(&job_id, &step.step_id)?;
        let job_dir = self.store.job_dir(&job_id)?;
        state.current_step = Some(step.step_id.clone());

        let max_attempts = step
            .max_attempts
            .unwrap_or(self.settings.runner_max_attempts_per_step)
            .max(1);
        let timeout = Duration::from_secs(
            step.timeout_sec
                .unwrap_or(self.settings.step_timeout_sec_default)
                .max(1),
        );

        let Some(worker) = self.registry.get(&step.agent) else {
            let error = ErrorInfo::new(
                ErrorCode::WorkerNotFound,
                format!("unknown agent '{}'", step.agent),
            );
            let result = self.synthesized_step_result(spec, step, 1, &error);
            return self.conclude_failure(spec, step, state, 1, result);
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.record_step(state, step, StepPhase::Running, attempt, None)?;

            // Reserve one API call before the attempt; an empty budget
            // fails the step without retrying.
            if self.budget.enabled() {
                match self.budget.check_and_log(&step.agent, 1, 0.0) {
                    Ok(()) => {}
                    Err(BudgetError::Exceeded(message)) => {
                        let error = ErrorInfo::new(ErrorCode::BudgetExceeded, message);
                        let result = self.synthesized_step_result(spec, step, attempt, &error);
                        return self.conclude_failure(spec, step, state, attempt, result);
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            let cancel = CancelHandle::new();
            let ctx = StepContext {
                job: Arc::clone(spec),
                step: step.clone(),
                policy: policy.clone(),
                job_dir: job_dir.clone(),
                step_dir: step_dir.clone(),
                workspace_dir: workdir.to_path_buf(),
                enable_real_cli: self.settings.enable_real_cli,
                step_timeout: timeout,
                idle_timeout: (self.settings.runner_max_idle_sec > 0)
                    .then(|| Duration::from_secs(self.settings.runner_max_idle_sec)),
                max_output_chars: self.settings.max_subprocess_output_chars,
                non_git_workdir_status: self.settings.non_git_workdir_status,
                redactor: Arc::clone(&self.redactor),
                cancel: cancel.clone(),
            };

            let mut shutdown_hit = false;
            let attempt_result: StepResult = tokio::select! {
                run = tokio::time::timeout(timeout, worker.run(&ctx)) => match run {
                    Ok(Ok(mut result)) => {
                        result.attempts = attempt;
                        // Contract: the three files must exist after a
                        // normal return.
                        let missing = self.store.missing_step_files(&job_id, &step.step_id)?;
                        if missing.is_empty() {
                            result
                        } else {
                            let error = ErrorInfo::new(
                                ErrorCode::WorkerContractViolation,
                                format!("worker did not write: {}", missing.join(", ")),
                            );
                            self.synthesized_step_result(spec, step, attempt, &error)
                        }
                    }
                    Ok(Err(worker_err)) => {
                        let error = match worker_err {
                            WorkerError::Io(io_err) => ErrorInfo::new(
                                ErrorCode::TransientIo,
                                io_err.to_string(),
                            ),
                            WorkerError::Policy(policy_err) => ErrorInfo::new(
                                ErrorCode::PolicyViolation,
                                policy_err.to_string(),
                            ),
                        };
                        self.synthesized_step_result(spec, step, attempt, &error)
                    }
                    Err(_elapsed) => {
                        cancel.cancel();
                        let error = ErrorInfo::new(
                            ErrorCode::Timeout,
                            format!("step exceeded its deadline of {}s", timeout.as_secs()),
                        );
                        self.synthesized_step_result(spec, step, attempt, &error)
                    }
                },
                _ = self.shutdown_grace() => {
                    shutdown_hit = true;
                    cancel.cancel();
                    let error = ErrorInfo::new(
                        ErrorCode::RunnerShutdown,
                        "runner shut down before the attempt could finish",
                    );
                    self.synthesized_step_result(spec, step, attempt, &error)
                }
            };

            // Record worker-reported cost after the fact; a budget trip
            // here is only logged, the spend already happened.
            if self.budget.enabled() {
                if let Some(cost) = attempt_result.metrics.cost_usd {
                    if let Err(e) = self.budget.check_and_log(&step.agent, 0, cost) {
                        warn!(job_id = %job_id, error = %e, "cost recorded over budget");
                    }
                }
            }

            if shutdown_hit {
                let error = attempt_result.error.clone().unwrap_or_else(|| {
                    ErrorInfo::new(ErrorCode::RunnerShutdown, "runner shutdown")
                });
                self.record_step(state, step, StepPhase::Failed, attempt, Some(error.clone()))?;
                return Ok((attempt_result, CursorMove::Shutdown(error)));
            }

            match attempt_result.status {
                StepStatus::Ok | StepStatus::Skipped => {
                    self.record_step(state, step, StepPhase::Ok, attempt, None)?;
                    return Ok((attempt_result, CursorMove::Advance));
                }
                StepStatus::NeedsHuman => {
                    self.record_step(
                        state,
                        step,
                        StepPhase::NeedsHuman,
                        attempt,
                        attempt_result.error.clone(),
                    )?;
                    return Ok((attempt_result, CursorMove::AskHuman));
                }
                StepStatus::Failed => {
                    let retriable = attempt_result
                        .error
                        .as_ref()
                        .is_some_and(ErrorInfo::is_retriable);
                    if retriable && attempt < max_attempts {
                        self.record_step(
                            state,
                            step,
                            StepPhase::Retrying,
                            attempt,
                            attempt_result.error.clone(),
                        )?;
                        continue;
                    }
                    return self.conclude_failure(spec, step, state, attempt, attempt_result);
                }
            }
        }
    }

    /// Final-failure bookkeeping: apply `on_failure`, then record the
    /// step phase matching the (possibly converted) result.
    fn conclude_failure(
        &self,
        spec: &JobSpec,
        step: &StepSpec,
        state: &mut JobState,
        attempt: u32,
        result: StepResult,
    ) -> Result<(StepResult, CursorMove), RunnerError> {
        let (result, cursor_move) = self.after_failure(spec, step, result);
        let phase = if matches!(cursor_move, CursorMove::AskHuman) {
            StepPhase::NeedsHuman
        } else {
            StepPhase::Failed
        };
        self.record_step(state, step, phase, attempt, result.error.clone())?;
        Ok((result, cursor_move))
    }

    /// Apply the step's `on_failure` directive to a final failed result.
    fn after_failure(
        &self,
        spec: &JobSpec,
        step: &StepSpec,
        mut result: StepResult,
    ) -> (StepResult, CursorMove) {
        let error = result
            .error
            .clone()
            .unwrap_or_else(|| ErrorInfo::new(ErrorCode::TransientIo, "step failed"));
        match &step.on_failure {
            OnFailure::Stop => (result, CursorMove::StopFailed(error)),
            OnFailure::Continue => (result, CursorMove::Advance),
            OnFailure::AskHuman => {
                // The parked step reads as needs_human, with its failure
                // preserved.
                result.status = StepStatus::NeedsHuman;
                (result, CursorMove::AskHuman)
            }
            OnFailure::Goto(target) => match spec.step_index(target) {
                Some(idx) => (result, CursorMove::Goto(idx)),
                None => {
                    // validate() catches this at enqueue; stay safe for
                    // externally written queue files.
                    let error = ErrorInfo::new(
                        ErrorCode::ValidationError,
                        format!("goto target '{target}' does not exist"),
                    );
                    (result, CursorMove::StopFailed(error))
                }
            },
        }
    }

    /// A result the runner fabricates when the worker could not (budget,
    /// timeout, contract violation, missing worker, shutdown).
    fn synthesized_step_result(
        &self,
        spec: &JobSpec,
        step: &StepSpec,
        attempt: u32,
        error: &ErrorInfo,
    ) -> StepResult {
        let now = utc_now_iso();
        StepResult::new(
            &spec.job_id,
            &step.step_id,
            &step.agent,
            &step.role,
            StepStatus::Failed,
            now.clone(),
            now,
        )
        .with_attempts(attempt)
        .with_error(error.clone())
    }

    fn record_step(
        &self,
        state: &mut JobState,
        step: &StepSpec,
        phase: StepPhase,
        attempts: u32,
        error: Option<ErrorInfo>,
    ) -> Result<(), RunnerError> {
        state.record_step(&step.step_id, phase, attempts, error, &utc_now_iso());
        self.write_state(state)
    }

    fn write_state(&self, state: &mut JobState) -> Result<(), RunnerError> {
        state.advance_revision();
        self.store.write_state(state)?;
        Ok(())
    }

    /// Where to restart after a reclaim or an approve: skip recorded
    /// terminal steps (replaying their persisted results into the
    /// aggregate) and resume after a needs_human step.
    fn resume_position(
        &self,
        state: &JobState,
        spec: &JobSpec,
    ) -> Result<(Vec<StepResult>, usize), RunnerError> {
        let mut executed = Vec::new();
        for (idx, step) in spec.steps.iter().enumerate() {
            match state.step_phase(&step.step_id) {
                Some(StepPhase::Ok) | Some(StepPhase::Failed) | Some(StepPhase::Skipped) => {
                    if let Some(result) =
                        self.store.read_step_result(&spec.job_id, &step.step_id)?
                    {
                        executed.push(result);
                    }
                }
                Some(StepPhase::NeedsHuman) => {
                    if let Some(result) =
                        self.store.read_step_result(&spec.job_id, &step.step_id)?
                    {
                        executed.push(result);
                    }
                    return Ok((executed, idx + 1));
                }
                _ => return Ok((executed, idx)),
            }
        }
        Ok((executed, spec.steps.len()))
    }

    /// Aggregate artifacts, persist the job result and state, and move
    /// the queue file.
    #[allow(clippy::too_many_arguments)]
    fn finish_job(
        &self,
        spec: &JobSpec,
        state: &mut JobState,
        executed: Vec<StepResult>,
        started_at: &str,
        status: JobStatus,
        job_error: Option<ErrorInfo>,
        terminal: Terminal,
    ) -> Result<(), RunnerError> {
        let job_id = &spec.job_id;
        let ended_at = utc_now_iso();

        let mut report = format!("# Job {job_id}\n\n## Goal\n\n{}\n", spec.goal);
        let mut patch = String::new();
        let mut logs = String::new();
        for result in &executed {
            let heading = format!("step {} ({}:{})", result.step_id, result.agent, result.role);
            let _ = write!(report, "\n---\n\n## Step {} ({}:{})\n\n", result.step_id, result.agent, result.role);
            report.push_str(
                &self
                    .store
                    .read_text(job_id, &format!("steps/{}/report.md", result.step_id))?
                    .unwrap_or_default(),
            );
            let step_patch = self
                .store
                .read_text(job_id, &format!("steps/{}/patch.diff", result.step_id))?
                .unwrap_or_default();
            if !step_patch.trim().is_empty() {
                let _ = write!(patch, "\n# --- {heading} ---\n\n{}\n", step_patch.trim_end());
            }
            let step_logs = self
                .store
                .read_text(job_id, &format!("steps/{}/logs.txt", result.step_id))?
                .unwrap_or_default();
            if !step_logs.trim().is_empty() {
                let _ = write!(logs, "\n# --- {heading} ---\n\n{}\n", step_logs.trim_end());
            }
        }

        let duration_ms = duration_between(started_at, &ended_at);
        let job_result = JobResult {
            kind: ResultKind::Job,
            job_id: job_id.clone(),
            status,
            started_at: started_at.to_string(),
            ended_at: ended_at.clone(),
            duration_ms,
            error: job_error,
            steps: executed,
        };
        self.store
            .write_job_artifacts(&job_result, &report, patch.trim_start(), logs.trim_start())?;

        let phase = match status {
            JobStatus::Ok => RunPhase::Ok,
            JobStatus::Failed => RunPhase::Failed,
            JobStatus::NeedsHuman => RunPhase::NeedsHuman,
        };
        state.finish(phase, &ended_at);
        self.write_state(state)?;

        self.queue.complete(job_id, terminal)?;
        info!(job_id = %job_id, status = %status, "job finished");
        Ok(())
    }

    /// Persist a synthesized failed result for a job that never reached
    /// (or cannot continue) step execution.
    fn write_job_failure(
        &self,
        job_id: &str,
        spec: Option<&JobSpec>,
        error: ErrorInfo,
    ) -> Result<(), RunnerError> {
        let now = utc_now_iso();
        let goal = spec.map(|s| s.goal.as_str()).unwrap_or("(unknown)");
        let report = format!(
            "# Job {job_id}\n\n## Goal\n\n{goal}\n\n## Failure\n\n- code: `{}`\n- message: {}\n",
            error.code, error.message
        );
        let steps = self
            .store
            .read_result(job_id)?
            .map(|prior| prior.steps)
            .unwrap_or_default();
        let job_result = JobResult {
            kind: ResultKind::Job,
            job_id: job_id.to_string(),
            status: JobStatus::Failed,
            started_at: now.clone(),
            ended_at: now.clone(),
            duration_ms: 0,
            error: Some(error),
            steps,
        };
        self.store.write_job_artifacts(&job_result, &report, "", "")?;

        if let Some(mut state) = self.store.read_state(job_id)? {
            state.finish(RunPhase::Failed, &now);
            self.write_state(&mut state)?;
        }
        Ok(())
    }

    /// Resolves once the shutdown flag is up and the grace window has
    /// passed.
    async fn shutdown_grace(&self) {
        while !self.shutting_down() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_secs(self.settings.shutdown_grace_sec)).await;
    }
}

/// Millisecond span between two ISO-8601 stamps; zero when unparsable.
fn duration_between(start: &str, end: &str) -> u64 {
    use chrono::DateTime;
    let (Ok(start), Ok(end)) = (
        DateTime::parse_from_rfc3339(start),
        DateTime::parse_from_rfc3339(end),
    ) else {
        return 0;
    };
    (end - start).num_milliseconds().max(0) as u64
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
