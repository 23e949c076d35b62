// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution under the environment hygiene rules.
//!
//! Commands are argument lists, never shell strings. The child
//! environment is rebuilt from scratch: a small safe base (PATH, HOME,
//! TMPDIR; PATH only when `clear_env`) plus allowlisted variables from
//! the parent. Children are killed on wall-clock deadline, on idle (no
//! output for the watchdog interval) and on cancellation; tokio's
//! `kill_on_drop` reaps anything that survives an early return.

use crate::context::CancelHandle;
use capture::CaptureBuf;
use std::collections::BTreeSet;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::warn;

const SAFE_BASE_KEYS: [&str; 3] = ["PATH", "HOME", "TMPDIR"];
const SAFE_BASE_KEYS_CLEAR: [&str; 1] = ["PATH"];
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default timeout for short git plumbing commands.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Request for one policy-gated subprocess run.
pub struct CommandRequest<'a> {
    /// Full argv; `cmd[0]` has already passed the binary allowlist.
    pub cmd: &'a [String],
    pub cwd: &'a Path,
    pub env_allowlist: &'a BTreeSet<String>,
    pub clear_env: bool,
    pub timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_output_chars: usize,
    pub cancel: CancelHandle,
}

/// What happened to the child.
#[derive(Debug, Clone, Default)]
pub struct CommandOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub idle_killed: bool,
    pub cancelled: bool,
}

/// Build the scrubbed child environment.
pub fn child_env(allowlist: &BTreeSet<String>, clear_env: bool) -> Vec<(String, String)> {
    let base: &[&str] = if clear_env {
        &SAFE_BASE_KEYS_CLEAR
    } else {
        &SAFE_BASE_KEYS
    };
    let mut env = Vec::new();
    for key in base {
        if let Ok(value) = std::env::var(key) {
            env.push((key.to_string(), value));
        }
    }
    for key in allowlist {
        if base.contains(&key.as_str()) {
            continue;
        }
        match std::env::var(key) {
            Ok(value) => env.push((key.clone(), value)),
            Err(_) => warn!(var = %key, "env allowlist variable missing from process env"),
        }
    }
    env
}

/// Run a subprocess to completion or death.
pub async fn run_command(req: CommandRequest<'_>) -> std::io::Result<CommandOutcome> {
    let start = Instant::now();
    let (program, args) = req
        .cmd
        .split_first()
        .ok_or_else(|| std::io::Error::other("empty command"))?;

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(req.cwd)
        .env_clear()
        .envs(child_env(req.env_allowlist, req.clear_env))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let last_output = Arc::new(Mutex::new(Instant::now()));
    let out_buf = Arc::new(Mutex::new(CaptureBuf::new(req.max_output_chars)));
    let err_buf = Arc::new(Mutex::new(CaptureBuf::new(req.max_output_chars)));

    let out_task = stdout.map(|pipe| {
        tokio::spawn(read_lines(pipe, Arc::clone(&out_buf), Arc::clone(&last_output)))
    });
    let err_task = stderr.map(|pipe| {
        tokio::spawn(read_lines(pipe, Arc::clone(&err_buf), Arc::clone(&last_output)))
    });

    let deadline = start + req.timeout;
    let mut outcome = CommandOutcome::default();

    // wait() is cancel-safe; polling it under a short timeout lets the
    // deadline, idle and cancellation checks run between polls.
    let status = loop {
        match tokio::time::timeout(POLL_INTERVAL, child.wait()).await {
            Ok(status) => break status?,
            Err(_elapsed) => {
                let now = Instant::now();
                if now >= deadline {
                    outcome.timed_out = true;
                    let _ = child.start_kill();
                } else if let Some(idle) = req.idle_timeout {
                    let silent_for = now.duration_since(*last_output.lock().await);
                    if silent_for >= idle {
                        outcome.idle_killed = true;
                        let _ = child.start_kill();
                    }
                }
                if req.cancel.is_cancelled() {
                    outcome.cancelled = true;
                    let _ = child.start_kill();
                }
            }
        }
    };

    if let Some(task) = out_task {
        let _ = task.await;
    }
    if let Some(task) = err_task {
        let _ = task.await;
    }

    outcome.exit_code = status.code().unwrap_or(-1);
    outcome.stdout = out_buf.lock().await.take();
    outcome.stderr = err_buf.lock().await.take();
    outcome.duration_ms = start.elapsed().as_millis() as u64;
    Ok(outcome)
}

async fn read_lines(
    pipe: impl tokio::io::AsyncRead + Unpin,
    buf: Arc<Mutex<CaptureBuf>>,
    last_output: Arc<Mutex<Instant>>,
) {
    let mut reader = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        *last_output.lock().await = Instant::now();
        buf.lock().await.push_line(&line);
    }
}

/// Run a short helper command (git plumbing) with a timeout; returns a
/// descriptive error string on failure. Used where the full policy
/// machinery would be overkill.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<std::process::Output, String> {
    cmd.kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(format!("{description} failed: {io_err}")),
        Err(_elapsed) => Err(format!(
            "{description} timed out after {}s",
            timeout.as_secs()
        )),
    }
}

/// Capped line-oriented capture buffer.
mod capture {
    pub struct CaptureBuf {
        text: String,
        chars: usize,
        limit: usize,
        truncated: bool,
    }

    impl CaptureBuf {
        pub fn new(limit: usize) -> Self {
            Self {
                text: String::new(),
                chars: 0,
                limit,
                truncated: false,
            }
        }

        pub fn push_line(&mut self, line: &str) {
            if self.truncated {
                return;
            }
            let budget = self.limit.saturating_sub(self.chars);
            if budget == 0 {
                self.truncated = true;
                self.text.push_str("\n[truncated:output_limit]\n");
                return;
            }
            let len = line.chars().count();
            if len > budget {
                self.text.extend(line.chars().take(budget));
                self.chars += budget;
                self.truncated = true;
                self.text.push_str("\n[truncated:output_limit]\n");
            } else {
                self.text.push_str(line);
                self.text.push('\n');
                self.chars += len + 1;
            }
        }

        pub fn take(&mut self) -> String {
            std::mem::take(&mut self.text)
        }
    }
}

/// A bare command rooted in `dir` with stdin closed; used by the git
/// helpers and the workspace manager.
pub fn command_in(dir: &Path, program: &str, args: &[&str]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(dir).stdin(Stdio::null());
    cmd
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
