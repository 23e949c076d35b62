// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gantry - submit and manage orchestrator jobs from the shell.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gantry_engine::Settings;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gantry", version, about = "Gantry - filesystem job orchestration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job JSON file (a full spec or a minimal {goal, ...} payload)
    Submit {
        /// Path to the job file
        path: PathBuf,
    },
    /// Print a job's result.json, if it exists yet
    Result {
        job_id: String,
    },
    /// Print a job's queue folder and operational state
    Status {
        job_id: String,
    },
    /// Release an awaiting_approval job back to pending
    Approve {
        job_id: String,
    },
    /// Force a running job back to pending
    Unlock {
        job_id: String,
    },
    /// List job ids per queue folder
    List,
    /// Move stale running jobs back to pending
    Recover {
        /// Override RUNNER_RECLAIM_AFTER_SEC for this pass
        #[arg(long)]
        stale_after_sec: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load();
    match cli.command {
        Commands::Submit { path } => commands::submit(&settings, &path),
        Commands::Result { job_id } => commands::result(&settings, &job_id),
        Commands::Status { job_id } => commands::status(&settings, &job_id),
        Commands::Approve { job_id } => commands::approve(&settings, &job_id),
        Commands::Unlock { job_id } => commands::unlock(&settings, &job_id),
        Commands::List => commands::list(&settings),
        Commands::Recover { stale_after_sec } => commands::recover(&settings, stale_after_sec),
    }
}
