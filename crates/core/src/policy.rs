// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution policy: sandboxing, binary and environment allowlists.
//!
//! The effective policy for a job is the config-level policy narrowed by
//! the job's own [`PolicySpec`] overrides; narrowing can only tighten
//! (sandbox stays on, deny wins, allowlists intersect).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("ALLOWED_BINARIES is empty; refusing to execute external commands")]
    EmptyAllowlist,
    #[error("binary '{0}' is not in the allowed_binaries allowlist")]
    BinaryNotAllowed(String),
    #[error("sandbox is enabled but no sandbox wrapper is configured")]
    WrapperMissing,
    #[error("network policy 'deny' requires a sandbox wrapper to enforce isolation")]
    NetworkDenyUnenforced,
}

/// Advisory network stance; enforced only through the sandbox wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkPolicy {
    Allow,
    Deny,
}

/// Per-job policy overrides as they appear in a [`crate::JobSpec`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_binaries: Option<Vec<String>>,
}

/// The effective policy applied to every subprocess spawn.
#[derive(Debug, Clone)]
pub struct ExecutionPolicy {
    pub sandbox: bool,
    pub sandbox_wrapper: Option<String>,
    pub sandbox_wrapper_args: Vec<String>,
    pub network_policy: NetworkPolicy,
    pub allowed_binaries: BTreeSet<String>,
    pub env_allowlist: BTreeSet<String>,
    pub sensitive_env_vars: BTreeSet<String>,
    pub sandbox_clear_env: bool,
    pub max_input_artifacts_files: usize,
    pub max_input_artifact_chars: usize,
    pub max_input_artifacts_chars: usize,
}

impl ExecutionPolicy {
    /// Narrow this policy with a job's overrides.
    ///
    /// Sandbox can only stay on (`config AND job`), `deny` wins for the
    /// network stance, and the binary allowlist intersects. The sandbox
    /// wrapper is re-added after intersection so wrapping never fails for
    /// a binary the job did allow.
    pub fn for_job(&self, overrides: Option<&PolicySpec>) -> ExecutionPolicy {
        let mut effective = self.clone();
        let Some(spec) = overrides else {
            return effective;
        };

        if let Some(job_sandbox) = spec.sandbox {
            effective.sandbox = self.sandbox && job_sandbox;
        }
        if let Some(job_network) = spec.network {
            effective.network_policy =
                if self.network_policy == NetworkPolicy::Deny || job_network == NetworkPolicy::Deny
                {
                    NetworkPolicy::Deny
                } else {
                    NetworkPolicy::Allow
                };
        }
        if let Some(job_binaries) = &spec.allowed_binaries {
            let requested: BTreeSet<String> = job_binaries
                .iter()
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect();
            effective.allowed_binaries = effective
                .allowed_binaries
                .intersection(&requested)
                .cloned()
                .collect();
            if effective.sandbox {
                if let Some(wrapper) = &effective.sandbox_wrapper {
                    effective.allowed_binaries.insert(wrapper.clone());
                }
            }
        }

        effective
    }

    /// Preconditions for executing real CLI workers under this policy.
    pub fn assert_real_cli_safe(&self) -> Result<(), PolicyError> {
        if self.sandbox && self.sandbox_wrapper.is_none() {
            return Err(PolicyError::WrapperMissing);
        }
        if self.network_policy == NetworkPolicy::Deny && self.sandbox_wrapper.is_none() {
            return Err(PolicyError::NetworkDenyUnenforced);
        }
        Ok(())
    }

    /// Check a binary against the allowlist by its basename.
    pub fn assert_binary_allowed(&self, binary: &str) -> Result<(), PolicyError> {
        if self.allowed_binaries.is_empty() {
            return Err(PolicyError::EmptyAllowlist);
        }
        let basename = Path::new(binary)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| binary.to_string());
        if !self.allowed_binaries.contains(&basename) {
            return Err(PolicyError::BinaryNotAllowed(basename));
        }
        Ok(())
    }

    /// Validate a command against the allowlist and prepend the sandbox
    /// wrapper when sandboxing is on. Refuses to run when sandboxing is
    /// requested but no wrapper is configured.
    pub fn wrap_command(&self, cmd: Vec<String>) -> Result<Vec<String>, PolicyError> {
        let Some(binary) = cmd.first() else {
            return Err(PolicyError::EmptyAllowlist);
        };
        self.assert_binary_allowed(binary)?;

        if !self.sandbox {
            return Ok(cmd);
        }
        let Some(wrapper) = &self.sandbox_wrapper else {
            return Err(PolicyError::WrapperMissing);
        };
        self.assert_binary_allowed(wrapper)?;

        let mut wrapped = Vec::with_capacity(1 + self.sandbox_wrapper_args.len() + cmd.len());
        wrapped.push(wrapper.clone());
        wrapped.extend(self.sandbox_wrapper_args.iter().cloned());
        wrapped.extend(cmd);
        Ok(wrapped)
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
