// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gantry-queue: durable filesystem job queue.
//!
//! Jobs move between sibling directories under the queue root by atomic
//! rename, which is the only synchronization primitive the orchestrator
//! needs. Any number of runner processes may share one queue as long as
//! it lives on a single POSIX filesystem.

pub mod queue;

pub use queue::{ClaimedJob, FileQueue, JobFolder, QueueError, ReclaimOutcome, Terminal};
