// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable cron scheduler.
//!
//! Entries come from a JSON config file read at startup; the next fire
//! time per entry is persisted to `scheduler_state.json` (atomic rewrite
//! each tick). Entries missing from the state file are initialized to
//! the next boundary after now, never back-filled, so a long outage
//! cannot unleash a storm of overdue jobs. Synthesized job ids embed the
//! fire boundary, which makes a re-fire after a crash collapse into a
//! tolerated duplicate enqueue.

use chrono::{DateTime, Utc};
use cron::Schedule;
use gantry_core::{default_pipeline, time_fmt, JobSpec, PolicySpec, StepSpec};
use gantry_queue::{FileQueue, QueueError};
use gantry_storage::artifacts::atomic_write;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("schedule '{name}': bad cron expression '{expr}': {message}")]
    BadCron {
        name: String,
        expr: String,
        message: String,
    },
    #[error("schedules file {path}: {message}")]
    BadConfig { path: PathBuf, message: String },
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Spec template a schedule stamps out on every fire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobTemplate {
    pub goal: String,
    #[serde(default = "default_workdir")]
    pub workdir: String,
    /// Empty means the default plan → implement → review pipeline.
    #[serde(default)]
    pub steps: Vec<StepSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicySpec>,
}

fn default_workdir() -> String {
    ".".to_string()
}

/// One cron entry from the schedules file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleEntry {
    pub name: String,
    /// Standard 5-field cron, month and day-of-week names allowed.
    pub cron: String,
    pub job_template: JobTemplate,
}

/// The `cron` crate wants a seconds field; a standard 5-field expression
/// fires at second zero.
fn normalize_cron(expr: &str) -> String {
    let fields = expr.split_whitespace().count();
    if fields == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

#[derive(Debug)]
pub struct CronScheduler {
    queue: FileQueue,
    entries: Vec<(ScheduleEntry, Schedule)>,
    state_path: PathBuf,
    next_fires: BTreeMap<String, DateTime<Utc>>,
}

impl CronScheduler {
    /// Parse all entries and load the persisted next-fire table. A
    /// corrupt state file is discarded with a warning; the entries are
    /// then re-initialized forward from now on the first tick.
    pub fn new(
        queue: FileQueue,
        entries: Vec<ScheduleEntry>,
        state_path: impl Into<PathBuf>,
    ) -> Result<Self, SchedulerError> {
        let mut parsed = Vec::with_capacity(entries.len());
        for entry in entries {
            let schedule = Schedule::from_str(&normalize_cron(&entry.cron)).map_err(|e| {
                SchedulerError::BadCron {
                    name: entry.name.clone(),
                    expr: entry.cron.clone(),
                    message: e.to_string(),
                }
            })?;
            parsed.push((entry, schedule));
        }

        let state_path = state_path.into();
        let next_fires = match std::fs::read_to_string(&state_path) {
            Ok(body) => match serde_json::from_str(&body) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %state_path.display(), error = %e, "corrupt scheduler state, starting fresh");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };

        Ok(Self {
            queue,
            entries: parsed,
            state_path,
            next_fires,
        })
    }

    /// Load schedule entries from a JSON file. A missing file is an
    /// empty schedule.
    pub fn load_entries(path: &std::path::Path) -> Result<Vec<ScheduleEntry>, SchedulerError> {
        let body = match std::fs::read_to_string(path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&body).map_err(|e| SchedulerError::BadConfig {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Evaluate every entry against `now`; returns how many jobs were
    /// enqueued this tick.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<u32, SchedulerError> {
        let mut fired = 0;

        for (entry, schedule) in &self.entries {
            match self.next_fires.get(&entry.name).copied() {
                None => {
                    // New entry: schedule strictly forward, no backfill.
                    if let Some(next) = schedule.after(&now).next() {
                        info!(schedule = %entry.name, next = %next, "schedule initialized");
                        self.next_fires.insert(entry.name.clone(), next);
                    }
                }
                Some(due) if due <= now => {
                    let spec = synthesize_job(entry, due);
                    match self.queue.enqueue(&spec) {
                        Ok(job_id) => {
                            fired += 1;
                            info!(schedule = %entry.name, job_id = %job_id, "enqueued scheduled job");
                        }
                        Err(QueueError::DuplicateJob(job_id)) => {
                            // The boundary already fired (e.g. before a
                            // restart); the id collision is the dedup.
                            warn!(schedule = %entry.name, job_id = %job_id, "skipping duplicate scheduled job");
                        }
                        Err(e) => return Err(e.into()),
                    }
                    if let Some(next) = schedule.after(&now).next() {
                        self.next_fires.insert(entry.name.clone(), next);
                    }
                }
                Some(_) => {}
            }
        }

        self.save_state()?;
        Ok(fired)
    }

    pub fn next_fire(&self, name: &str) -> Option<DateTime<Utc>> {
        self.next_fires.get(name).copied()
    }

    fn save_state(&self) -> Result<(), SchedulerError> {
        let mut body = serde_json::to_string_pretty(&self.next_fires)
            .unwrap_or_else(|_| "{}".to_string());
        body.push('\n');
        atomic_write(&self.state_path, body.as_bytes())?;
        Ok(())
    }
}

/// Template a concrete job for one fire boundary.
fn synthesize_job(entry: &ScheduleEntry, fire_time: DateTime<Utc>) -> JobSpec {
    let template = &entry.job_template;
    let steps = if template.steps.is_empty() {
        default_pipeline(&template.goal)
    } else {
        template.steps.clone()
    };
    JobSpec {
        job_id: format!("{}-{}", entry.name, time_fmt::compact_stamp(fire_time)),
        goal: template.goal.clone(),
        workdir: template.workdir.clone(),
        steps,
        policy: template.policy.clone(),
        context_window: None,
        context_strategy: None,
        schedule: Some(entry.cron.clone()),
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
