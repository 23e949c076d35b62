// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn allowed(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn version_extraction() {
    assert_eq!(extract_version("git version 2.44.0").as_deref(), Some("2.44.0"));
    assert_eq!(extract_version("codex 1.2").as_deref(), Some("1.2"));
    assert_eq!(extract_version("no digits here"), None);
}

#[test]
fn version_tuples_compare_numerically() {
    assert!(version_tuple("1.10.0") > version_tuple("1.9.9"));
    assert!(version_tuple("2.0") > version_tuple("1.99.99"));
    assert_eq!(version_tuple("1.2.3"), vec![1, 2, 3]);
}

#[tokio::test]
async fn missing_allowlist_entry_fails() {
    let err = assert_real_cli_ready(&allowed(&[]), &HashMap::new(), &["git"])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not in ALLOWED_BINARIES"));
}

#[tokio::test]
async fn binary_absent_from_path_fails() {
    let err = assert_real_cli_ready(
        &allowed(&["gantry-no-such-binary"]),
        &HashMap::new(),
        &["gantry-no-such-binary"],
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("not found in PATH"));
}

#[tokio::test]
async fn present_binary_without_version_floor_passes() {
    // `sh` exists everywhere the tests run
    let result = assert_real_cli_ready(&allowed(&["sh"]), &HashMap::new(), &["sh"]).await;
    assert!(result.unwrap().is_empty());
}

#[tokio::test]
async fn version_floor_failure_is_reported() {
    let mut versions = HashMap::new();
    versions.insert(
        "sh".to_string(),
        ("9999.0".to_string(), "--version".to_string()),
    );
    let result = assert_real_cli_ready(&allowed(&["sh"]), &versions, &["sh"]).await;
    // either the shell reports a parseable (too low) version or no
    // version at all; both must fail the preflight
    assert!(result.is_err());
}
