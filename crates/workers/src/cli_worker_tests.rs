// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{test_context, test_policy};
use gantry_core::StepStatus;
use tempfile::TempDir;

#[tokio::test]
async fn simulation_writes_the_contract_files() {
    let dir = TempDir::new().unwrap();
    let ctx = test_context(dir.path(), "j1", "01_plan");
    let worker = CliWorker::opencode();

    let result = worker.run(&ctx).await.unwrap();
    assert_eq!(result.status, StepStatus::Ok);
    assert_eq!(result.step_id, "01_plan");
    for name in ["report.md", "patch.diff", "logs.txt"] {
        assert!(ctx.step_dir.join(name).is_file(), "{name} missing");
    }
    assert!(result.error.is_none());
    assert!(result
        .artifacts
        .contains(&"steps/01_plan/report.md".to_string()));
}

#[tokio::test]
async fn simulated_implementer_produces_a_patch() {
    let dir = TempDir::new().unwrap();
    let mut ctx = test_context(dir.path(), "j1", "02_implement");
    ctx.step.agent = "codex".to_string();
    ctx.step.role = "implementer".to_string();

    let result = CliWorker::codex().run(&ctx).await.unwrap();
    assert_eq!(result.status, StepStatus::Ok);
    let patch = std::fs::read_to_string(ctx.step_dir.join("patch.diff")).unwrap();
    assert!(patch.starts_with("diff --git"));
}

#[tokio::test]
async fn real_mode_on_non_git_workspace_reports_configured_status() {
    let dir = TempDir::new().unwrap();
    let mut ctx = test_context(dir.path(), "j1", "a");
    ctx.enable_real_cli = true;
    ctx.non_git_workdir_status = StepStatus::NeedsHuman;
    std::fs::create_dir_all(&ctx.workspace_dir).unwrap();

    let result = CliWorker::codex().run(&ctx).await.unwrap();
    assert_eq!(result.status, StepStatus::NeedsHuman);
    let error = result.error.unwrap();
    assert_eq!(error.code, gantry_core::ErrorCode::PolicyViolation);
    // early failures still honor the artifact contract
    for name in ["report.md", "patch.diff", "logs.txt"] {
        assert!(ctx.step_dir.join(name).is_file(), "{name} missing");
    }
}

#[tokio::test]
async fn real_mode_refuses_disallowed_binary() {
    let dir = TempDir::new().unwrap();
    let mut ctx = test_context(dir.path(), "j1", "a");
    ctx.enable_real_cli = true;
    ctx.policy = test_policy();
    ctx.policy.allowed_binaries.remove("codex");
    // a git workspace so the policy check is what trips
    std::fs::create_dir_all(ctx.workspace_dir.join(".git")).unwrap();

    let result = CliWorker::codex().run(&ctx).await.unwrap();
    assert_eq!(result.status, StepStatus::Failed);
    assert_eq!(
        result.error.unwrap().code,
        gantry_core::ErrorCode::PolicyViolation
    );
}

#[tokio::test]
async fn patch_traversal_fails_the_step() {
    let dir = TempDir::new().unwrap();
    let mut ctx = test_context(dir.path(), "j1", "a");
    ctx.enable_real_cli = true;
    ctx.step.apply_patches_from = vec!["../../evil.diff".to_string()];
    std::fs::create_dir_all(ctx.workspace_dir.join(".git")).unwrap();

    let result = CliWorker::codex().run(&ctx).await.unwrap();
    assert_eq!(result.status, StepStatus::Failed);
    assert_eq!(result.error.unwrap().code, gantry_core::ErrorCode::PathTraversal);
}

#[test]
fn claude_tool_defaults_follow_role() {
    assert!(default_claude_tools("implementer").contains(&"Write".to_string()));
    assert!(!default_claude_tools("reviewer").contains(&"Write".to_string()));
    assert!(default_claude_tools("").contains(&"Read".to_string()));
}

#[test]
fn classify_maps_outcomes() {
    let timeout = Duration::from_secs(5);

    let ok = CommandOutcome {
        exit_code: 0,
        ..Default::default()
    };
    assert_eq!(classify(&ok, timeout).0, StepStatus::Ok);

    let failed = CommandOutcome {
        exit_code: 2,
        ..Default::default()
    };
    let (status, error) = classify(&failed, timeout);
    assert_eq!(status, StepStatus::Failed);
    let error = error.unwrap();
    assert_eq!(error.code, gantry_core::ErrorCode::SubprocessExitNonzero);
    assert!(error.is_retriable());

    let timed = CommandOutcome {
        timed_out: true,
        ..Default::default()
    };
    let (_, error) = classify(&timed, timeout);
    assert_eq!(error.unwrap().code, gantry_core::ErrorCode::Timeout);
}

#[test]
fn worker_names_match_binaries() {
    assert_eq!(CliWorker::opencode().name(), "opencode");
    assert_eq!(CliWorker::codex().name(), "codex");
    assert_eq!(CliWorker::claude().name(), "claude");
}
