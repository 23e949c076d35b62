// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess-backed coding-agent workers (opencode, codex, claude).
//!
//! Without `ENABLE_REAL_CLI` every adapter runs its simulation branch:
//! deterministic artifacts, always successful, no external processes.
//! With it, the adapter assembles the agent command line, wraps it per
//! the execution policy, runs it in the job workspace and captures a
//! `git diff` against the pre-run HEAD as the step's patch.

use crate::context::StepContext;
use crate::git;
use crate::prompt::build_full_prompt;
use crate::registry::{Worker, WorkerError};
use crate::subprocess::{run_command, CommandOutcome, CommandRequest};
use async_trait::async_trait;
use gantry_core::{utc_now_iso, ErrorCode, ErrorInfo, StepResult, StepStatus};
use gantry_storage::resolve_under;
use serde_json::json;
use std::fmt::Write as _;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliKind {
    OpenCode,
    Codex,
    Claude,
}

/// A worker that drives one of the supported agent CLIs.
pub struct CliWorker {
    kind: CliKind,
}

impl CliWorker {
    pub fn opencode() -> Self {
        Self {
            kind: CliKind::OpenCode,
        }
    }

    pub fn codex() -> Self {
        Self {
            kind: CliKind::Codex,
        }
    }

    pub fn claude() -> Self {
        Self {
            kind: CliKind::Claude,
        }
    }

    fn binary(&self) -> &'static str {
        match self.kind {
            CliKind::OpenCode => "opencode",
            CliKind::Codex => "codex",
            CliKind::Claude => "claude",
        }
    }

    fn build_cmd(&self, ctx: &StepContext, full_prompt: &str) -> Vec<String> {
        let s = |v: &str| v.to_string();
        match self.kind {
            CliKind::OpenCode => vec![
                s("opencode"),
                s("run"),
                s("--format"),
                s("json"),
                s(full_prompt),
            ],
            CliKind::Codex => vec![s("codex"), s("exec"), s("--json"), s(full_prompt)],
            CliKind::Claude => {
                let tools = ctx
                    .step
                    .allowed_tools
                    .clone()
                    .unwrap_or_else(|| default_claude_tools(&ctx.step.role));
                vec![
                    s("claude"),
                    s("-p"),
                    s(full_prompt),
                    s("--allowedTools"),
                    tools.join(","),
                    s("--output-format"),
                    s("json"),
                ]
            }
        }
    }

    async fn run_real(&self, ctx: &StepContext) -> Result<StepResult, WorkerError> {
        let started_at = utc_now_iso();

        if let Some(result) = self.apply_requested_patches(ctx, &started_at).await? {
            return Ok(result);
        }

        if !git::is_git_repo(&ctx.workspace_dir) {
            let error = ErrorInfo::new(
                ErrorCode::PolicyViolation,
                format!(
                    "workspace {} is not a git repository",
                    ctx.workspace_dir.display()
                ),
            );
            return self.early_failure(ctx, &started_at, ctx.non_git_workdir_status, error);
        }

        let full_prompt = build_full_prompt(ctx);
        let base_commit = git::head_commit(&ctx.workspace_dir).await;

        let cmd = match ctx.policy.wrap_command(self.build_cmd(ctx, &full_prompt)) {
            Ok(cmd) => cmd,
            Err(policy_err) => {
                let error = ErrorInfo::new(ErrorCode::PolicyViolation, policy_err.to_string());
                return self.early_failure(ctx, &started_at, StepStatus::Failed, error);
            }
        };

        let timeout = ctx.step_timeout;
        let outcome = run_command(CommandRequest {
            cmd: &cmd,
            cwd: &ctx.workspace_dir,
            env_allowlist: &ctx.policy.env_allowlist,
            clear_env: ctx.policy.sandbox_clear_env,
            timeout,
            idle_timeout: ctx.idle_timeout,
            max_output_chars: ctx.max_output_chars,
            cancel: ctx.cancel.clone(),
        })
        .await?;
        let ended_at = utc_now_iso();

        let (status, error) = classify(&outcome, timeout);
        let patch_diff = git::diff_since(&ctx.workspace_dir, base_commit.as_deref()).await;

        let report_md = self.report(ctx, &outcome);
        let logs_txt = self.logs(ctx, &outcome, status, &patch_diff);
        ctx.write_step_files(&report_md, &patch_diff, &logs_txt)?;
        ctx.write_raw_capture(&outcome.stdout, &outcome.stderr)?;

        let mut result = StepResult::new(
            &ctx.job.job_id,
            &ctx.step.step_id,
            &ctx.step.agent,
            &ctx.step.role,
            status,
            started_at,
            ended_at,
        );
        result.metrics.duration_ms = outcome.duration_ms;
        result.error = error;
        Ok(result)
    }

    /// Apply `apply_patches_from` to the workspace before the agent runs.
    /// Returns an early failure result when anything goes wrong; patch
    /// problems are never retried.
    async fn apply_requested_patches(
        &self,
        ctx: &StepContext,
        started_at: &str,
    ) -> Result<Option<StepResult>, WorkerError> {
        for rel in &ctx.step.apply_patches_from {
            let resolved = match resolve_under(&ctx.job_dir, rel) {
                Ok(path) => path,
                Err(_) => {
                    let error = ErrorInfo::new(
                        ErrorCode::PathTraversal,
                        format!("patch path '{rel}' escapes the job artifact root"),
                    );
                    return self
                        .early_failure(ctx, started_at, StepStatus::Failed, error)
                        .map(Some);
                }
            };
            if let Err(message) = git::apply_patch(&ctx.workspace_dir, &resolved).await {
                let error = ErrorInfo::new(ErrorCode::PatchApplyFailed, message)
                    .with_details(json!({ "patch": rel }));
                return self
                    .early_failure(ctx, started_at, StepStatus::Failed, error)
                    .map(Some);
            }
        }
        Ok(None)
    }

    fn early_failure(
        &self,
        ctx: &StepContext,
        started_at: &str,
        status: StepStatus,
        error: ErrorInfo,
    ) -> Result<StepResult, WorkerError> {
        let ended_at = utc_now_iso();
        let report_md = format!(
            "# {} step {} [{status}]\n\n- error: `{}`\n- message: {}\n",
            ctx.step.agent, ctx.step.step_id, error.code, error.message
        );
        let logs_txt = format!(
            "[{}] {} run skipped\nstatus={status}\nerror={}\n",
            ctx.step.step_id, ctx.step.agent, error.code
        );
        ctx.write_step_files(&report_md, "", &logs_txt)?;

        let result = StepResult::new(
            &ctx.job.job_id,
            &ctx.step.step_id,
            &ctx.step.agent,
            &ctx.step.role,
            status,
            started_at,
            ended_at,
        )
        .with_error(error);
        Ok(result)
    }

    fn report(&self, ctx: &StepContext, outcome: &CommandOutcome) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "# {} step {}\n\n## Exit code\n\n`{}`\n\n",
            ctx.step.agent, ctx.step.step_id, outcome.exit_code
        );
        let _ = write!(
            out,
            "## Raw stdout\n\n```\n{}\n```\n\n## Raw stderr\n\n```\n{}\n```\n",
            clip(&outcome.stdout, 8000),
            clip(&outcome.stderr, 8000)
        );
        out
    }

    fn logs(
        &self,
        ctx: &StepContext,
        outcome: &CommandOutcome,
        status: StepStatus,
        patch_diff: &str,
    ) -> String {
        let mut out = format!(
            "[{}] {} run\nexit_code={}\nduration_ms={}\ntimed_out={}\nidle_killed={}\nstatus={status}\n",
            ctx.step.step_id,
            ctx.step.agent,
            outcome.exit_code,
            outcome.duration_ms,
            outcome.timed_out,
            outcome.idle_killed,
        );
        if status == StepStatus::Ok {
            let change_status = if patch_diff.trim().is_empty() {
                "no_changes"
            } else {
                "changed"
            };
            let _ = writeln!(out, "change_status={change_status}");
        }
        out
    }

    async fn simulate(&self, ctx: &StepContext) -> Result<StepResult, WorkerError> {
        let started_at = utc_now_iso();
        // Simulated "thinking" keeps timing-sensitive tests honest.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let full_prompt = build_full_prompt(ctx);
        let ended_at = utc_now_iso();

        let (flavor, body) = match self.kind {
            CliKind::OpenCode => (
                "Planner output (simulated)",
                "## Plan\n\n1. Inspect the workspace\n2. Identify the change\n3. Implement the patch\n4. Run the tests\n",
            ),
            CliKind::Codex => (
                "Implementation output (simulated)",
                "## Changes\n\nApplied the planned change and staged a patch.\n",
            ),
            CliKind::Claude => (
                "Review output (simulated)",
                "## Review\n\nNo blocking issues found in the simulated change.\n",
            ),
        };

        let report_md = format!(
            "# {flavor}\n\nAgent: **{}**\n\n## Goal\n\n{}\n\n## Prompt length\n\n{}\n\n{body}",
            ctx.step.agent,
            ctx.job.goal,
            full_prompt.chars().count()
        );
        let patch_diff = match self.kind {
            CliKind::Codex => format!(
                "diff --git a/README.md b/README.md\nindex 0000000..1111111 100644\n--- a/README.md\n+++ b/README.md\n@@ -0,0 +1,1 @@\n+Simulated change from {}:{}\n",
                ctx.step.agent, ctx.step.role
            ),
            _ => String::new(),
        };
        let logs_txt = format!(
            "[{}] simulated {} run\nprompt_chars={}\n",
            ctx.step.step_id,
            ctx.step.role,
            full_prompt.chars().count()
        );

        ctx.write_step_files(&report_md, &patch_diff, &logs_txt)?;

        let mut result = StepResult::new(
            &ctx.job.job_id,
            &ctx.step.step_id,
            &ctx.step.agent,
            &ctx.step.role,
            StepStatus::Ok,
            started_at,
            ended_at,
        );
        result.metrics.duration_ms = 50;
        Ok(result)
    }
}

#[async_trait]
impl Worker for CliWorker {
    fn name(&self) -> &str {
        self.binary()
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepResult, WorkerError> {
        std::fs::create_dir_all(&ctx.step_dir)?;
        if !ctx.enable_real_cli {
            return self.simulate(ctx).await;
        }
        self.run_real(ctx).await
    }
}

/// Map a finished subprocess onto a step status and error.
fn classify(outcome: &CommandOutcome, timeout: Duration) -> (StepStatus, Option<ErrorInfo>) {
    if outcome.timed_out || outcome.idle_killed {
        let error = ErrorInfo::new(
            ErrorCode::Timeout,
            format!("agent exceeded its deadline of {}s", timeout.as_secs()),
        )
        .with_details(json!({ "idle": outcome.idle_killed }));
        return (StepStatus::Failed, Some(error));
    }
    if outcome.cancelled {
        let error = ErrorInfo::new(ErrorCode::Timeout, "agent cancelled by the runner");
        return (StepStatus::Failed, Some(error));
    }
    if outcome.exit_code != 0 {
        let error = ErrorInfo::new(
            ErrorCode::SubprocessExitNonzero,
            format!("agent exited with code {}", outcome.exit_code),
        )
        .with_details(json!({ "exit_code": outcome.exit_code, "retriable": true }));
        return (StepStatus::Failed, Some(error));
    }
    (StepStatus::Ok, None)
}

/// Claude tool defaults by role: implementers may write, everyone else
/// reads.
fn default_claude_tools(role: &str) -> Vec<String> {
    let role = role.to_ascii_lowercase();
    let tools: &[&str] = if role.contains("implement") {
        &["Read", "Write", "Edit", "Bash(git *)"]
    } else {
        &["Read", "Grep", "Glob"]
    };
    tools.iter().map(|t| t.to_string()).collect()
}

fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
#[path = "cli_worker_tests.rs"]
mod tests;
