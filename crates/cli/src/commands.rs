// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command implementations for the `gantry` binary.

use anyhow::{bail, Context, Result};
use gantry_core::{default_pipeline, JobSpec, PolicySpec, StepSpec};
use gantry_engine::Settings;
use gantry_queue::{FileQueue, JobFolder};
use gantry_storage::ArtifactStore;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Minimal submission payload; expanded through the default pipeline.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MinimalSubmit {
    goal: String,
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    workdir: Option<String>,
    #[serde(default)]
    steps: Option<Vec<StepSpec>>,
    #[serde(default)]
    policy: Option<PolicySpec>,
}

fn open_queue(settings: &Settings) -> Result<FileQueue> {
    FileQueue::new(&settings.queue_root)
        .with_context(|| format!("opening queue at {}", settings.queue_root.display()))
}

/// Parse the file as a full spec first, then as the minimal payload.
fn parse_submission(body: &str) -> Result<JobSpec> {
    if let Ok(spec) = serde_json::from_str::<JobSpec>(body) {
        return Ok(spec);
    }
    let minimal: MinimalSubmit =
        serde_json::from_str(body).context("job file is neither a full JobSpec nor {goal, ...}")?;
    if minimal.goal.trim().is_empty() {
        bail!("job file must carry a non-empty goal");
    }
    let steps = match minimal.steps {
        Some(steps) if !steps.is_empty() => steps,
        _ => default_pipeline(&minimal.goal),
    };
    Ok(JobSpec {
        job_id: minimal
            .job_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()),
        goal: minimal.goal,
        workdir: minimal.workdir.unwrap_or_else(|| ".".to_string()),
        steps,
        policy: minimal.policy,
        context_window: None,
        context_strategy: None,
        schedule: None,
    })
}

pub fn submit(settings: &Settings, path: &Path) -> Result<()> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let spec = parse_submission(&body)?;
    spec.validate().context("invalid job spec")?;

    let queue = open_queue(settings)?;
    let job_id = queue.enqueue(&spec)?;
    println!("{job_id}");
    Ok(())
}

pub fn result(settings: &Settings, job_id: &str) -> Result<()> {
    let store = ArtifactStore::new(&settings.artifacts_root);
    match store.read_result(job_id)? {
        Some(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        None => bail!("no result yet for job '{job_id}'"),
    }
}

pub fn status(settings: &Settings, job_id: &str) -> Result<()> {
    let queue = open_queue(settings)?;
    let store = ArtifactStore::new(&settings.artifacts_root);
    let folder = queue
        .locate(job_id)?
        .map(|f| f.dir_name())
        .unwrap_or("unknown");
    let state = store.read_state(job_id)?;
    let summary = serde_json::json!({
        "job_id": job_id,
        "queue_state": folder,
        "state": state,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub fn approve(settings: &Settings, job_id: &str) -> Result<()> {
    open_queue(settings)?.approve(job_id)?;
    println!("{job_id} approved, back in pending/");
    Ok(())
}

pub fn unlock(settings: &Settings, job_id: &str) -> Result<()> {
    open_queue(settings)?.unlock(job_id)?;
    println!("{job_id} unlocked, back in pending/");
    Ok(())
}

pub fn list(settings: &Settings) -> Result<()> {
    let queue = open_queue(settings)?;
    for folder in JobFolder::ALL {
        let ids = queue.list_job_ids(folder)?;
        println!("{} ({})", folder.dir_name(), ids.len());
        for id in ids {
            println!("  {id}");
        }
    }
    Ok(())
}

pub fn recover(settings: &Settings, stale_after_sec: Option<u64>) -> Result<()> {
    let queue = open_queue(settings)?;
    let stale_after = Duration::from_secs(
        stale_after_sec.unwrap_or(settings.runner_reclaim_after_sec),
    );
    let outcome = queue.reclaim_stale_running(stale_after, settings.max_reclaim_attempts)?;
    println!(
        "requeued: {:?}\nexhausted: {:?}",
        outcome.requeued, outcome.exhausted
    );
    Ok(())
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
