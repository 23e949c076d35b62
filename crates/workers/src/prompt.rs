// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt assembly: the step prompt plus materialized input artifacts.
//!
//! Input artifacts are read from `artifacts/<job_id>/` with three caps
//! from the effective policy: file count, per-file characters and total
//! characters. Anything cut off is marked inline so the agent knows the
//! context is incomplete. A path that fails containment is replaced by
//! an `[invalid_path]` marker rather than failing the step; a missing
//! file becomes `[missing]`.

use crate::context::StepContext;
use gantry_storage::resolve_under;
use std::fs;

const BEGIN: &str = "=== BEGIN ARTIFACT:";
const END: &str = "=== END ARTIFACT ===";

/// Build the full prompt for a step.
pub fn build_full_prompt(ctx: &StepContext) -> String {
    let prompt = ctx.step.prompt.as_str();
    if ctx.step.input_artifacts.is_empty() {
        return prompt.to_string();
    }

    let mut parts: Vec<String> = vec![
        prompt.trim_end().to_string(),
        String::new(),
        "## Input artifacts".to_string(),
    ];
    let max_files = ctx.policy.max_input_artifacts_files;
    let per_file_limit = ctx.policy.max_input_artifact_chars;
    let mut remaining_total = ctx.policy.max_input_artifacts_chars;
    let mut used_files = 0usize;
    let mut truncated = false;

    for rel_path in &ctx.step.input_artifacts {
        if used_files >= max_files {
            truncated = true;
            break;
        }
        used_files += 1;

        let header = format!("{BEGIN} {rel_path} ===");
        let resolved = match resolve_under(&ctx.job_dir, rel_path) {
            Ok(path) => path,
            Err(_) => {
                parts.extend([header, "[invalid_path]".to_string(), END.to_string()]);
                continue;
            }
        };
        let Ok(mut text) = fs::read_to_string(&resolved) else {
            parts.extend([header, "[missing]".to_string(), END.to_string()]);
            continue;
        };

        let mut notes: Vec<&str> = Vec::new();
        if text.chars().count() > per_file_limit {
            text = text.chars().take(per_file_limit).collect();
            notes.push("[truncated:file_limit]");
        }

        if remaining_total == 0 {
            parts.extend([header, "[truncated:total_limit]".to_string(), END.to_string()]);
            truncated = true;
            continue;
        }
        let len = text.chars().count();
        if len > remaining_total {
            text = text.chars().take(remaining_total).collect();
            remaining_total = 0;
            notes.push("[truncated:total_limit]");
        } else {
            remaining_total -= len;
        }

        if !notes.is_empty() {
            truncated = true;
            text.push('\n');
            text.push_str(&notes.join("\n"));
        }
        parts.extend([header, text, END.to_string()]);
    }

    if truncated {
        parts.push("[artifacts_truncated_or_limited]".to_string());
    }

    let mut out = parts.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
