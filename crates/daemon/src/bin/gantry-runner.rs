// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! gantry-runner: claims jobs from the queue and executes them.
//!
//! Start as many of these as the host can carry; the queue's atomic
//! renames keep them from stepping on each other.

use anyhow::Result;
use gantry_daemon::{init_logging, spawn_signal_listener};
use gantry_engine::{assert_real_cli_ready, Runner, Settings};
use gantry_workers::WorkerRegistry;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load();
    init_logging(settings.log_json);

    let registry = WorkerRegistry::standard();
    if settings.enable_real_cli {
        let names = registry.names();
        let mut required: Vec<&str> = names.iter().map(String::as_str).collect();
        required.push("git");
        let versions = assert_real_cli_ready(
            &settings.allowed_binaries,
            &settings.min_binary_versions,
            &required,
        )
        .await?;
        if !versions.is_empty() {
            info!(?versions, "real CLI preflight versions");
        }
    }

    let runner = Runner::new(settings, registry)?;
    spawn_signal_listener(runner.shutdown_handle());
    runner.run_forever().await?;
    Ok(())
}
