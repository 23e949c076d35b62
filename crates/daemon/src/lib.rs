// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared plumbing for the `gantry-runner` and `gantry-scheduler`
//! processes: logging setup and signal-driven shutdown flags.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Install the tracing subscriber: `RUST_LOG`-style filtering with an
/// `info` default, JSON output when `LOG_JSON` asks for it.
pub fn init_logging(log_json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

/// Flip `flag` when SIGTERM or SIGINT arrives, so the main loop drains.
pub fn spawn_signal_listener(flag: Arc<AtomicBool>) {
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => return,
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(_) => return,
        };
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, draining"),
            _ = sigint.recv() => info!("received SIGINT, draining"),
        }
        flag.store(true, Ordering::SeqCst);
    });
}
