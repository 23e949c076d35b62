// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn step(step_id: &str, agent: &str) -> StepSpec {
    StepSpec {
        step_id: step_id.to_string(),
        agent: agent.to_string(),
        role: String::new(),
        prompt: String::new(),
        input_artifacts: Vec::new(),
        apply_patches_from: Vec::new(),
        allowed_tools: None,
        timeout_sec: None,
        max_attempts: None,
        on_failure: OnFailure::Stop,
    }
}

fn job(job_id: &str, steps: Vec<StepSpec>) -> JobSpec {
    JobSpec {
        job_id: job_id.to_string(),
        goal: "demo".to_string(),
        workdir: ".".to_string(),
        steps,
        policy: None,
        context_window: None,
        context_strategy: None,
        schedule: None,
    }
}

#[test]
fn valid_job_passes() {
    let spec = job("j1", vec![step("01_plan", "opencode"), step("02_impl", "codex")]);
    assert!(spec.validate().is_ok());
}

#[test]
fn job_id_rejects_path_separators() {
    assert!(matches!(
        validate_job_id("a/b"),
        Err(ValidationError::JobIdPathSeparator(_))
    ));
    assert!(matches!(
        validate_job_id("a\\b"),
        Err(ValidationError::JobIdPathSeparator(_))
    ));
}

#[test]
fn job_id_rejects_leading_dot_and_empty() {
    assert!(matches!(
        validate_job_id(".hidden"),
        Err(ValidationError::JobIdLeadingDot(_))
    ));
    assert!(matches!(validate_job_id(""), Err(ValidationError::EmptyJobId)));
}

#[test]
fn job_id_allows_odd_but_safe_characters() {
    assert!(validate_job_id("job 1 (retry)").is_ok());
    assert!(validate_job_id("job-1.2026").is_ok());
}

#[test]
fn empty_steps_rejected() {
    let spec = job("j1", Vec::new());
    assert!(matches!(spec.validate(), Err(ValidationError::NoSteps)));
}

#[test]
fn duplicate_step_ids_rejected() {
    let spec = job("j1", vec![step("a", "x"), step("a", "y")]);
    assert!(matches!(
        spec.validate(),
        Err(ValidationError::DuplicateStepId(_))
    ));
}

#[test]
fn unsafe_step_id_rejected() {
    let spec = job("j1", vec![step("a/b", "x")]);
    assert!(matches!(spec.validate(), Err(ValidationError::UnsafeStepId(_))));
}

#[test]
fn goto_target_must_exist() {
    let mut bad = step("a", "x");
    bad.on_failure = OnFailure::Goto("nope".to_string());
    let spec = job("j1", vec![bad]);
    assert!(matches!(
        spec.validate(),
        Err(ValidationError::GotoTargetMissing { .. })
    ));

    let mut good = step("a", "x");
    good.on_failure = OnFailure::Goto("b".to_string());
    let spec = job("j1", vec![good, step("b", "y")]);
    assert!(spec.validate().is_ok());
}

#[test]
fn traversal_artifact_paths_rejected() {
    let mut s = step("a", "x");
    s.input_artifacts = vec!["../outside.md".to_string()];
    let spec = job("j1", vec![s]);
    assert!(matches!(
        spec.validate(),
        Err(ValidationError::BadArtifactPath { .. })
    ));

    let mut s = step("a", "x");
    s.input_artifacts = vec!["/etc/passwd".to_string()];
    assert!(matches!(
        job("j1", vec![s]).validate(),
        Err(ValidationError::BadArtifactPath { .. })
    ));

    let mut s = step("a", "x");
    s.input_artifacts = vec!["steps/a/../b/report.md".to_string()];
    assert!(job("j1", vec![s]).validate().is_ok());
}

#[test]
fn on_failure_round_trips_through_strings() {
    for (text, parsed) in [
        ("stop", OnFailure::Stop),
        ("continue", OnFailure::Continue),
        ("ask_human", OnFailure::AskHuman),
        ("goto:01_plan", OnFailure::Goto("01_plan".to_string())),
    ] {
        let of = OnFailure::try_from(text.to_string()).unwrap();
        assert_eq!(of, parsed);
        assert_eq!(of.to_string(), text);
    }

    assert!(OnFailure::try_from("goto:".to_string()).is_err());
    assert!(OnFailure::try_from("retry".to_string()).is_err());
}

#[test]
fn on_failure_serde_uses_directive_strings() {
    let json = serde_json::to_string(&OnFailure::Goto("fix".to_string())).unwrap();
    assert_eq!(json, "\"goto:fix\"");
    let parsed: OnFailure = serde_json::from_str("\"ask_human\"").unwrap();
    assert_eq!(parsed, OnFailure::AskHuman);
}

#[test]
fn unknown_spec_fields_rejected() {
    let raw = r#"{
        "job_id": "j1",
        "goal": "demo",
        "workdir": ".",
        "steps": [{"step_id": "a", "agent": "opencode"}],
        "surprise": true
    }"#;
    assert!(serde_json::from_str::<JobSpec>(raw).is_err());
}

#[test]
fn minimal_step_fields_default() {
    let raw = r#"{"step_id": "a", "agent": "opencode"}"#;
    let s: StepSpec = serde_json::from_str(raw).unwrap();
    assert_eq!(s.on_failure, OnFailure::Stop);
    assert!(s.prompt.is_empty());
    assert!(s.timeout_sec.is_none());
}

#[test]
fn default_pipeline_shape() {
    let steps = default_pipeline("ship it");
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[0].step_id, "01_plan");
    assert_eq!(steps[1].agent, "codex");
    assert_eq!(steps[2].role, "reviewer");
    assert!(steps[2]
        .input_artifacts
        .contains(&"steps/02_implement/patch.diff".to_string()));

    let spec = job("j1", steps);
    assert!(spec.validate().is_ok());
}

#[test]
fn step_index_finds_definition_position() {
    let spec = job("j1", vec![step("a", "x"), step("b", "y")]);
    assert_eq!(spec.step_index("b"), Some(1));
    assert_eq!(spec.step_index("zz"), None);
}
