// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup checks before real CLI execution is allowed.
//!
//! Every required binary must be allowlisted and present on PATH; a
//! binary with a declared minimum version must report at least that
//! version through its version command (default `--version`).

use gantry_workers::subprocess::run_with_timeout;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
#[error("real CLI preflight failed: {0}")]
pub struct PreflightError(pub String);

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+){1,3})").unwrap_or_else(|e| panic!("{e}")))
}

fn extract_version(text: &str) -> Option<String> {
    version_re().find(text).map(|m| m.as_str().to_string())
}

fn version_tuple(version: &str) -> Vec<u64> {
    version.split('.').filter_map(|p| p.parse().ok()).collect()
}

fn found_on_path(binary: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| {
        let candidate = dir.join(binary);
        candidate.is_file()
    })
}

/// Verify the environment for real CLI execution; returns the resolved
/// versions of binaries that declared a minimum.
pub async fn assert_real_cli_ready(
    allowed_binaries: &BTreeSet<String>,
    min_binary_versions: &HashMap<String, (String, String)>,
    required_binaries: &[&str],
) -> Result<BTreeMap<String, String>, PreflightError> {
    let mut errors: Vec<String> = Vec::new();
    let mut resolved: BTreeMap<String, String> = BTreeMap::new();

    for binary in required_binaries {
        if !allowed_binaries.contains(*binary) {
            errors.push(format!("{binary}: not in ALLOWED_BINARIES"));
            continue;
        }
        if !found_on_path(binary) {
            errors.push(format!("{binary}: executable not found in PATH"));
            continue;
        }
        let Some((min_version, version_cmd)) = min_binary_versions.get(*binary) else {
            continue;
        };

        let mut cmd = Command::new(binary);
        cmd.arg(version_cmd).current_dir(Path::new("."));
        match run_with_timeout(cmd, VERSION_TIMEOUT, binary).await {
            Err(message) => errors.push(format!("{binary}: {message}")),
            Ok(output) => {
                let text = if output.stdout.is_empty() {
                    String::from_utf8_lossy(&output.stderr).into_owned()
                } else {
                    String::from_utf8_lossy(&output.stdout).into_owned()
                };
                if !output.status.success() {
                    errors.push(format!(
                        "{binary}: version command exited with {}",
                        output.status.code().unwrap_or(-1)
                    ));
                    continue;
                }
                match extract_version(&text) {
                    None => errors.push(format!(
                        "{binary}: cannot parse a version from '{}'",
                        text.trim().chars().take(120).collect::<String>()
                    )),
                    Some(actual) => {
                        if version_tuple(&actual) < version_tuple(min_version) {
                            errors.push(format!(
                                "{binary}: version {actual} is lower than required {min_version}"
                            ));
                        }
                        resolved.insert(binary.to_string(), actual);
                    }
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(resolved)
    } else {
        Err(PreflightError(errors.join("; ")))
    }
}

#[cfg(test)]
#[path = "preflight_tests.rs"]
mod tests;
