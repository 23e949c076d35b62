// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secret redaction for everything that reaches disk or a log line.
//!
//! Two layers: exact values of configured sensitive environment
//! variables, then a built-in catalogue of secret-shaped patterns.
//! Env values are masked first so a secret that also matches a generic
//! pattern keeps its more specific label.

use regex::Regex;
use std::sync::OnceLock;

/// Env values shorter than this are never treated as secrets; masking
/// tiny strings would shred unrelated text.
const MIN_SECRET_LEN: usize = 8;

fn builtin_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"sk-ant-[A-Za-z0-9_\-]{20,}", "anthropic_key"),
            (r"sk-[A-Za-z0-9]{20,}", "openai_key"),
            (r"AKIA[0-9A-Z]{16}", "aws_access_key"),
            (r"ghp_[A-Za-z0-9]{36}", "github_token"),
            (r"xox[baprs]-[A-Za-z0-9\-]{10,}", "slack_token"),
            (r"-----BEGIN [A-Z ]*PRIVATE KEY-----", "pem_private_key"),
            (
                r"(?i)\b(api_key|apikey|secret|password|token)\b\s*[:=]\s*\S+",
                "credential",
            ),
        ]
        .iter()
        .map(|(pattern, label)| {
            let re = Regex::new(pattern).unwrap_or_else(|e| panic!("builtin pattern: {e}"));
            (re, *label)
        })
        .collect()
    })
}

/// Masks secrets out of arbitrary text.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    /// (env var name, value) pairs captured at construction time.
    env_values: Vec<(String, String)>,
}

impl Redactor {
    /// Capture current values of the named environment variables.
    pub fn from_env<I, S>(sensitive_env_vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let env_values = sensitive_env_vars
            .into_iter()
            .filter_map(|name| {
                let name = name.as_ref().to_string();
                std::env::var(&name).ok().and_then(|value| {
                    (value.len() >= MIN_SECRET_LEN).then_some((name, value))
                })
            })
            .collect();
        Self { env_values }
    }

    /// Construct from explicit (name, value) pairs.
    pub fn with_values(pairs: Vec<(String, String)>) -> Self {
        let env_values = pairs
            .into_iter()
            .filter(|(_, value)| value.len() >= MIN_SECRET_LEN)
            .collect();
        Self { env_values }
    }

    /// Return `text` with all known secrets masked.
    pub fn redact(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mut out = text.to_string();
        for (name, value) in &self.env_values {
            if out.contains(value.as_str()) {
                out = out.replace(value.as_str(), &format!("[REDACTED:env:{name}]"));
            }
        }
        for (pattern, label) in builtin_patterns() {
            if *label == "credential" {
                out = pattern
                    .replace_all(&out, format!("$1=[REDACTED:{label}]"))
                    .into_owned();
            } else {
                out = pattern
                    .replace_all(&out, format!("[REDACTED:{label}]"))
                    .into_owned();
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "redact_tests.rs"]
mod tests;
