// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! gantry-scheduler: evaluates cron entries and enqueues scheduled jobs.

use anyhow::Result;
use chrono::Utc;
use gantry_daemon::{init_logging, spawn_signal_listener};
use gantry_engine::{CronScheduler, Settings};
use gantry_queue::FileQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load();
    init_logging(settings.log_json);

    let entries = CronScheduler::load_entries(&settings.schedules_path)?;
    info!(
        schedules = entries.len(),
        path = %settings.schedules_path.display(),
        "scheduler started"
    );

    let queue = FileQueue::new(&settings.queue_root)?;
    let mut scheduler = CronScheduler::new(queue, entries, &settings.scheduler_state_path)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_listener(Arc::clone(&shutdown));

    let tick = Duration::from_secs(settings.scheduler_tick_sec.max(1));
    while !shutdown.load(Ordering::SeqCst) {
        if let Err(e) = scheduler.tick(Utc::now()) {
            error!(error = %e, "scheduler tick failed");
        }
        tokio::time::sleep(tick).await;
    }
    info!("scheduler stopped");
    Ok(())
}
