// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::test_context;
use gantry_core::{StepStatus, StepResult};
use tempfile::TempDir;

#[test]
fn standard_registry_knows_the_three_agents() {
    let registry = WorkerRegistry::standard();
    assert_eq!(registry.names(), vec!["claude", "codex", "opencode"]);
    assert!(registry.get("codex").is_some());
    assert!(registry.get("my_agent").is_none());
}

struct EchoWorker;

#[async_trait]
impl Worker for EchoWorker {
    fn name(&self) -> &str {
        "echo"
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepResult, WorkerError> {
        std::fs::create_dir_all(&ctx.step_dir)?;
        ctx.write_step_files("echo report", "", "echo logs")?;
        Ok(StepResult::new(
            &ctx.job.job_id,
            &ctx.step.step_id,
            "echo",
            &ctx.step.role,
            StepStatus::Ok,
            "t0",
            "t1",
        ))
    }
}

#[tokio::test]
async fn custom_workers_can_be_registered() {
    let mut registry = WorkerRegistry::standard();
    registry.register(Arc::new(EchoWorker));

    let dir = TempDir::new().unwrap();
    let ctx = test_context(dir.path(), "j1", "a");
    let worker = registry.get("echo").unwrap();
    let result = worker.run(&ctx).await.unwrap();
    assert_eq!(result.status, StepStatus::Ok);
    assert!(ctx.step_dir.join("report.md").exists());
}

#[test]
fn later_registration_wins_for_a_name() {
    let mut registry = WorkerRegistry::new();
    registry.register(Arc::new(EchoWorker));
    registry.register(Arc::new(EchoWorker));
    assert_eq!(registry.names(), vec!["echo"]);
}
