// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker trait and the name → worker registry.
//!
//! The registry is built once at startup and read-only afterwards; there
//! is no lazy registration mid-flight.

use crate::cli_worker::CliWorker;
use crate::context::StepContext;
use async_trait::async_trait;
use gantry_core::{PolicyError, StepResult};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Infrastructure failures a worker cannot express as a step result.
///
/// The runner maps these onto failed results (`transient_io` for I/O,
/// `policy_violation` for refused spawns) rather than letting them kill
/// the loop.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// A named adapter executing one step.
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    /// Execute the step. Must write `report.md`, `patch.diff` and
    /// `logs.txt` into `ctx.step_dir` and reflect the outcome in the
    /// returned result's `status`.
    async fn run(&self, ctx: &StepContext) -> Result<StepResult, WorkerError>;
}

/// Process-wide name → worker mapping, assembled at startup.
#[derive(Default, Clone)]
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock registry: the three coding-agent CLI adapters.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CliWorker::opencode()));
        registry.register(Arc::new(CliWorker::codex()));
        registry.register(Arc::new(CliWorker::claude()));
        registry
    }

    pub fn register(&mut self, worker: Arc<dyn Worker>) {
        self.workers.insert(worker.name().to_string(), worker);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Worker>> {
        self.workers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
