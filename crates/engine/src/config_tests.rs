// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gantry_core::StepStatus;
use serial_test::serial;

fn clear_gantry_env() {
    for var in [
        "QUEUE_ROOT",
        "ARTIFACTS_ROOT",
        "WORKSPACES_ROOT",
        "PROJECT_ALIASES",
        "ALLOWED_BINARIES",
        "MIN_BINARY_VERSIONS",
        "NETWORK_POLICY",
        "NON_GIT_WORKDIR_STATUS",
        "RUNNER_MAX_ATTEMPTS_PER_STEP",
        "SANDBOX_WRAPPER",
        "SANDBOX_WRAPPER_ARGS",
        "ENABLE_REAL_CLI",
        "MAX_DAILY_API_CALLS",
    ] {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn defaults_without_environment() {
    clear_gantry_env();
    let settings = Settings::load();
    assert_eq!(settings.queue_root, PathBuf::from("var/queue"));
    assert_eq!(settings.runner_poll_interval_sec, 1);
    assert_eq!(settings.runner_reclaim_after_sec, 600);
    assert_eq!(settings.step_transition_limit, 64);
    assert_eq!(settings.max_reclaim_attempts, 3);
    assert!(!settings.enable_real_cli);
    assert!(settings.sandbox);
    assert_eq!(settings.network_policy, NetworkPolicy::Deny);
    assert_eq!(settings.non_git_workdir_status, StepStatus::NeedsHuman);
    assert!(settings.allowed_binaries.is_empty());
    assert!(settings.env_allowlist.contains("PATH"));
}

#[test]
#[serial]
fn csv_and_map_parsing() {
    clear_gantry_env();
    std::env::set_var("ALLOWED_BINARIES", "opencode, codex ,claude,");
    std::env::set_var("PROJECT_ALIASES", "web=/srv/web, api=/srv/api,broken");
    std::env::set_var("MIN_BINARY_VERSIONS", "codex=1.2.0,claude=2.0:version");

    let settings = Settings::load();
    assert_eq!(settings.allowed_binaries.len(), 3);
    assert!(settings.allowed_binaries.contains("codex"));
    assert_eq!(
        settings.project_aliases.get("web"),
        Some(&PathBuf::from("/srv/web"))
    );
    assert!(!settings.project_aliases.contains_key("broken"));
    assert_eq!(
        settings.min_binary_versions.get("codex"),
        Some(&("1.2.0".to_string(), "--version".to_string()))
    );
    assert_eq!(
        settings.min_binary_versions.get("claude"),
        Some(&("2.0".to_string(), "version".to_string()))
    );
    clear_gantry_env();
}

#[test]
#[serial]
fn malformed_values_fall_back_to_defaults() {
    clear_gantry_env();
    std::env::set_var("RUNNER_MAX_ATTEMPTS_PER_STEP", "not-a-number");
    std::env::set_var("NETWORK_POLICY", "whatever");
    std::env::set_var("NON_GIT_WORKDIR_STATUS", "explode");

    let settings = Settings::load();
    assert_eq!(settings.runner_max_attempts_per_step, 2);
    assert_eq!(settings.network_policy, NetworkPolicy::Deny);
    assert_eq!(settings.non_git_workdir_status, StepStatus::NeedsHuman);
    clear_gantry_env();
}

#[test]
#[serial]
fn wrapper_args_split_on_whitespace() {
    clear_gantry_env();
    std::env::set_var("SANDBOX_WRAPPER", "sandbox-exec");
    std::env::set_var("SANDBOX_WRAPPER_ARGS", "--profile agents  --quiet");

    let settings = Settings::load();
    assert_eq!(settings.sandbox_wrapper.as_deref(), Some("sandbox-exec"));
    assert_eq!(
        settings.sandbox_wrapper_args,
        vec!["--profile", "agents", "--quiet"]
    );
    clear_gantry_env();
}

#[test]
fn rooted_places_every_root_under_base() {
    let base = PathBuf::from("/tmp/gantry-test");
    let settings = Settings::rooted(&base);
    assert!(settings.queue_root.starts_with(&base));
    assert!(settings.artifacts_root.starts_with(&base));
    assert!(settings.workspaces_root.starts_with(&base));
    assert!(settings.state_db_path.starts_with(&base));
    assert!(settings.scheduler_state_path.starts_with(&base));
}

#[test]
fn base_policy_mirrors_settings() {
    let mut settings = Settings::rooted(&PathBuf::from("/tmp/x"));
    settings.sandbox = false;
    settings.allowed_binaries.insert("git".to_string());
    let policy = settings.base_policy();
    assert!(!policy.sandbox);
    assert!(policy.allowed_binaries.contains("git"));
    assert_eq!(policy.max_input_artifact_chars, 12_000);
}
