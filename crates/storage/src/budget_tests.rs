// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
}

#[test]
fn disabled_gate_accepts_everything() {
    let dir = TempDir::new().unwrap();
    let gate = BudgetGate::open(&dir.path().join("state.db"), 0, 0.0).unwrap();
    assert!(!gate.enabled());
    for _ in 0..100 {
        gate.check_and_log_on(date(), "codex", 1, 5.0).unwrap();
    }
}

#[test]
fn call_limit_is_enforced() {
    let dir = TempDir::new().unwrap();
    let gate = BudgetGate::open(&dir.path().join("state.db"), 3, 0.0).unwrap();
    assert!(gate.enabled());

    for _ in 0..3 {
        gate.check_and_log_on(date(), "codex", 1, 0.0).unwrap();
    }
    assert!(matches!(
        gate.check_and_log_on(date(), "codex", 1, 0.0),
        Err(BudgetError::Exceeded(_))
    ));
}

#[test]
fn cost_limit_is_enforced_across_workers() {
    let dir = TempDir::new().unwrap();
    let gate = BudgetGate::open(&dir.path().join("state.db"), 0, 1.0).unwrap();

    gate.check_and_log_on(date(), "codex", 1, 0.6).unwrap();
    gate.check_and_log_on(date(), "claude", 1, 0.4).unwrap();
    assert!(matches!(
        gate.check_and_log_on(date(), "opencode", 1, 0.01),
        Err(BudgetError::Exceeded(_))
    ));
}

#[test]
fn rejected_requests_record_nothing() {
    let dir = TempDir::new().unwrap();
    let gate = BudgetGate::open(&dir.path().join("state.db"), 2, 0.0).unwrap();

    gate.check_and_log_on(date(), "codex", 2, 0.0).unwrap();
    let _ = gate.check_and_log_on(date(), "codex", 1, 0.0);
    // the failed attempt must not have consumed budget on another day's
    // view of the same table
    let gate2 = BudgetGate::open(&dir.path().join("state.db"), 3, 0.0).unwrap();
    gate2.check_and_log_on(date(), "codex", 1, 0.0).unwrap();
}

#[test]
fn limits_are_per_day() {
    let dir = TempDir::new().unwrap();
    let gate = BudgetGate::open(&dir.path().join("state.db"), 1, 0.0).unwrap();

    gate.check_and_log_on(date(), "codex", 1, 0.0).unwrap();
    assert!(gate.check_and_log_on(date(), "codex", 1, 0.0).is_err());

    let tomorrow = date().succ_opt().unwrap();
    gate.check_and_log_on(tomorrow, "codex", 1, 0.0).unwrap();
}

#[test]
fn blank_worker_names_collapse_to_unknown() {
    let dir = TempDir::new().unwrap();
    let gate = BudgetGate::open(&dir.path().join("state.db"), 2, 0.0).unwrap();
    gate.check_and_log_on(date(), "  ", 1, 0.0).unwrap();
    gate.check_and_log_on(date(), "unknown", 1, 0.0).unwrap();
    assert!(gate.check_and_log_on(date(), "unknown", 1, 0.0).is_err());
}

#[test]
fn concurrent_check_and_log_never_overshoots() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("state.db");
    let limit = 20u32;
    // warm up the schema before the threads race
    BudgetGate::open(&db, limit, 0.0).unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let db = db.clone();
        handles.push(std::thread::spawn(move || {
            let gate = BudgetGate::open(&db, limit, 0.0).unwrap();
            let mut granted = 0u32;
            for _ in 0..10 {
                if gate.check_and_log_on(date(), "codex", 1, 0.0).is_ok() {
                    granted += 1;
                }
            }
            granted
        }));
    }

    let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(total <= limit, "granted {total} > limit {limit}");
    assert!(total > 0, "no grant succeeded at all");
}
