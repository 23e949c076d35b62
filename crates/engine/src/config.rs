// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime settings, loaded once from the environment at startup and
//! read-only afterwards. Malformed values fall back to their defaults.

use gantry_core::{ExecutionPolicy, NetworkPolicy, StepStatus};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

fn env_str(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_csv(name: &str, default: &str) -> BTreeSet<String> {
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `id=/abs/path,other=/elsewhere` → alias map.
fn env_path_map(name: &str) -> HashMap<String, PathBuf> {
    let mut out = HashMap::new();
    let Ok(raw) = std::env::var(name) else {
        return out;
    };
    for item in raw.split(',') {
        let Some((alias, path)) = item.split_once('=') else {
            continue;
        };
        let alias = alias.trim();
        let path = path.trim();
        if !alias.is_empty() && !path.is_empty() {
            out.insert(alias.to_string(), PathBuf::from(path));
        }
    }
    out
}

/// `bin=ver[:cmd],…` → name → (min version, version command).
fn env_version_map(name: &str) -> HashMap<String, (String, String)> {
    let mut out = HashMap::new();
    let Ok(raw) = std::env::var(name) else {
        return out;
    };
    for item in raw.split(',') {
        let Some((bin, rest)) = item.split_once('=') else {
            continue;
        };
        let bin = bin.trim();
        if bin.is_empty() {
            continue;
        }
        let (version, cmd) = match rest.split_once(':') {
            Some((v, c)) if !c.trim().is_empty() => (v.trim(), c.trim()),
            _ => (rest.trim(), "--version"),
        };
        if !version.is_empty() {
            out.insert(bin.to_string(), (version.to_string(), cmd.to_string()));
        }
    }
    out
}

/// Process-wide configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub queue_root: PathBuf,
    pub artifacts_root: PathBuf,
    pub workspaces_root: PathBuf,
    pub state_db_path: PathBuf,
    pub project_aliases: HashMap<String, PathBuf>,
    pub allow_absolute_workdir: bool,

    pub runner_poll_interval_sec: u64,
    pub runner_max_idle_sec: u64,
    pub runner_reclaim_after_sec: u64,
    pub runner_max_attempts_per_step: u32,
    pub max_reclaim_attempts: u32,
    pub step_transition_limit: u32,
    pub step_timeout_sec_default: u64,
    pub shutdown_grace_sec: u64,

    pub enable_real_cli: bool,
    pub sandbox: bool,
    pub sandbox_wrapper: Option<String>,
    pub sandbox_wrapper_args: Vec<String>,
    pub allowed_binaries: BTreeSet<String>,
    pub min_binary_versions: HashMap<String, (String, String)>,
    pub network_policy: NetworkPolicy,
    pub env_allowlist: BTreeSet<String>,
    pub sensitive_env_vars: BTreeSet<String>,
    pub sandbox_clear_env: bool,

    pub max_input_artifacts_files: usize,
    pub max_input_artifact_chars: usize,
    pub max_input_artifacts_chars: usize,
    pub max_subprocess_output_chars: usize,

    pub max_daily_api_calls: u32,
    pub max_daily_cost_usd: f64,

    pub non_git_workdir_status: StepStatus,
    pub retention_interval_sec: u64,
    pub artifacts_ttl_sec: u64,
    pub workspaces_ttl_sec: u64,

    pub schedules_path: PathBuf,
    pub scheduler_state_path: PathBuf,
    pub scheduler_tick_sec: u64,

    pub log_json: bool,
}

impl Settings {
    /// Load from the process environment.
    pub fn load() -> Self {
        let network_policy = match env_str("NETWORK_POLICY", "deny").to_ascii_lowercase().as_str()
        {
            "allow" => NetworkPolicy::Allow,
            _ => NetworkPolicy::Deny,
        };
        let non_git_workdir_status =
            match env_str("NON_GIT_WORKDIR_STATUS", "needs_human").to_ascii_lowercase().as_str() {
                "failed" => StepStatus::Failed,
                _ => StepStatus::NeedsHuman,
            };
        let sandbox_wrapper_args = env_opt("SANDBOX_WRAPPER_ARGS")
            .map(|raw| raw.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Self {
            queue_root: PathBuf::from(env_str("QUEUE_ROOT", "var/queue")),
            artifacts_root: PathBuf::from(env_str("ARTIFACTS_ROOT", "artifacts")),
            workspaces_root: PathBuf::from(env_str("WORKSPACES_ROOT", "workspaces")),
            state_db_path: PathBuf::from(env_str("STATE_DB_PATH", "var/state.db")),
            project_aliases: env_path_map("PROJECT_ALIASES"),
            allow_absolute_workdir: env_bool("ALLOW_ABSOLUTE_WORKDIR", true),

            runner_poll_interval_sec: env_u64("RUNNER_POLL_INTERVAL_SEC", 1),
            runner_max_idle_sec: env_u64("RUNNER_MAX_IDLE_SEC", 120),
            runner_reclaim_after_sec: env_u64("RUNNER_RECLAIM_AFTER_SEC", 600),
            runner_max_attempts_per_step: env_u32("RUNNER_MAX_ATTEMPTS_PER_STEP", 2).max(1),
            max_reclaim_attempts: env_u32("MAX_RECLAIM_ATTEMPTS", 3),
            step_transition_limit: env_u32("STEP_TRANSITION_LIMIT", 64),
            step_timeout_sec_default: env_u64("STEP_TIMEOUT_SEC", 600),
            shutdown_grace_sec: env_u64("SHUTDOWN_GRACE_SEC", 10),

            enable_real_cli: env_bool("ENABLE_REAL_CLI", false),
            sandbox: env_bool("SANDBOX", true),
            sandbox_wrapper: env_opt("SANDBOX_WRAPPER"),
            sandbox_wrapper_args,
            allowed_binaries: env_csv("ALLOWED_BINARIES", ""),
            min_binary_versions: env_version_map("MIN_BINARY_VERSIONS"),
            network_policy,
            env_allowlist: env_csv(
                "ENV_ALLOWLIST",
                "ANTHROPIC_API_KEY,OPENAI_API_KEY,PATH,HOME,TMPDIR",
            ),
            sensitive_env_vars: env_csv("SENSITIVE_ENV_VARS", "ANTHROPIC_API_KEY,OPENAI_API_KEY"),
            sandbox_clear_env: env_bool("SANDBOX_CLEAR_ENV", false),

            max_input_artifacts_files: env_usize("MAX_INPUT_ARTIFACTS_FILES", 10),
            max_input_artifact_chars: env_usize("MAX_INPUT_ARTIFACT_CHARS", 12_000),
            max_input_artifacts_chars: env_usize("MAX_INPUT_ARTIFACTS_CHARS", 40_000),
            max_subprocess_output_chars: env_usize("MAX_SUBPROCESS_OUTPUT_CHARS", 200_000),

            max_daily_api_calls: env_u32("MAX_DAILY_API_CALLS", 0),
            max_daily_cost_usd: env_f64("MAX_DAILY_COST_USD", 0.0).max(0.0),

            non_git_workdir_status,
            retention_interval_sec: env_u64("RETENTION_INTERVAL_SEC", 300),
            artifacts_ttl_sec: env_u64("ARTIFACTS_TTL_SEC", 604_800),
            workspaces_ttl_sec: env_u64("WORKSPACES_TTL_SEC", 172_800),

            schedules_path: PathBuf::from(env_str("SCHEDULES_PATH", "schedules.json")),
            scheduler_state_path: PathBuf::from(env_str(
                "SCHEDULER_STATE_PATH",
                "var/scheduler_state.json",
            )),
            scheduler_tick_sec: env_u64("SCHEDULER_TICK_SEC", 30),

            log_json: env_bool("LOG_JSON", false),
        }
    }

    /// Defaults with every data root placed under `base`; the fixture
    /// settings used by tests and ad-hoc tooling.
    pub fn rooted(base: &std::path::Path) -> Self {
        let mut settings = Self::template();
        settings.queue_root = base.join("queue");
        settings.artifacts_root = base.join("artifacts");
        settings.workspaces_root = base.join("workspaces");
        settings.state_db_path = base.join("var/state.db");
        settings.schedules_path = base.join("schedules.json");
        settings.scheduler_state_path = base.join("var/scheduler_state.json");
        settings
    }

    /// Pure defaults, no environment involved.
    fn template() -> Self {
        Self {
            queue_root: PathBuf::from("var/queue"),
            artifacts_root: PathBuf::from("artifacts"),
            workspaces_root: PathBuf::from("workspaces"),
            state_db_path: PathBuf::from("var/state.db"),
            project_aliases: HashMap::new(),
            allow_absolute_workdir: true,
            runner_poll_interval_sec: 1,
            runner_max_idle_sec: 120,
            runner_reclaim_after_sec: 600,
            runner_max_attempts_per_step: 2,
            max_reclaim_attempts: 3,
            step_transition_limit: 64,
            step_timeout_sec_default: 600,
            shutdown_grace_sec: 10,
            enable_real_cli: false,
            sandbox: true,
            sandbox_wrapper: None,
            sandbox_wrapper_args: Vec::new(),
            allowed_binaries: BTreeSet::new(),
            min_binary_versions: HashMap::new(),
            network_policy: NetworkPolicy::Deny,
            env_allowlist: ["ANTHROPIC_API_KEY", "OPENAI_API_KEY", "PATH", "HOME", "TMPDIR"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sensitive_env_vars: ["ANTHROPIC_API_KEY", "OPENAI_API_KEY"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sandbox_clear_env: false,
            max_input_artifacts_files: 10,
            max_input_artifact_chars: 12_000,
            max_input_artifacts_chars: 40_000,
            max_subprocess_output_chars: 200_000,
            max_daily_api_calls: 0,
            max_daily_cost_usd: 0.0,
            non_git_workdir_status: StepStatus::NeedsHuman,
            retention_interval_sec: 300,
            artifacts_ttl_sec: 604_800,
            workspaces_ttl_sec: 172_800,
            schedules_path: PathBuf::from("schedules.json"),
            scheduler_state_path: PathBuf::from("var/scheduler_state.json"),
            scheduler_tick_sec: 30,
            log_json: false,
        }
    }

    /// The config-level execution policy jobs are narrowed from.
    pub fn base_policy(&self) -> ExecutionPolicy {
        ExecutionPolicy {
            sandbox: self.sandbox,
            sandbox_wrapper: self.sandbox_wrapper.clone(),
            sandbox_wrapper_args: self.sandbox_wrapper_args.clone(),
            network_policy: self.network_policy,
            allowed_binaries: self.allowed_binaries.clone(),
            env_allowlist: self.env_allowlist.clone(),
            sensitive_env_vars: self.sensitive_env_vars.clone(),
            sandbox_clear_env: self.sandbox_clear_env,
            max_input_artifacts_files: self.max_input_artifacts_files,
            max_input_artifact_chars: self.max_input_artifact_chars,
            max_input_artifacts_chars: self.max_input_artifacts_chars,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
