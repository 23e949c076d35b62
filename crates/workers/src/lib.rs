// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gantry-workers: the worker contract and the adapters that fulfil it.
//!
//! A worker is a named adapter with one operation, `run(ctx)`. It must
//! write `report.md`, `patch.diff` and `logs.txt` into the step
//! directory, honor the cancellation handle, and return a step result
//! describing its outcome. The bundled CLI workers spawn an external
//! coding agent under the execution policy; without real-CLI mode they
//! fall back to deterministic simulation so the whole system runs end to
//! end with no external dependencies.

pub mod cli_worker;
pub mod context;
pub mod git;
pub mod prompt;
pub mod registry;
pub mod subprocess;

#[cfg(test)]
pub(crate) mod test_support;

pub use cli_worker::CliWorker;
pub use context::{CancelHandle, StepContext};
pub use prompt::build_full_prompt;
pub use registry::{Worker, WorkerError, WorkerRegistry};
pub use subprocess::{run_command, CommandOutcome, CommandRequest};
