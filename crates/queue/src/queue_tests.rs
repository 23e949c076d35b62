// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gantry_core::default_pipeline;
use std::collections::HashSet;
use std::fs::File;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn spec(job_id: &str) -> JobSpec {
    JobSpec {
        job_id: job_id.to_string(),
        goal: "demo".to_string(),
        workdir: ".".to_string(),
        steps: default_pipeline("demo"),
        policy: None,
        context_window: None,
        context_strategy: None,
        schedule: None,
    }
}

fn queue() -> (TempDir, FileQueue) {
    let dir = TempDir::new().unwrap();
    let q = FileQueue::new(dir.path().join("queue")).unwrap();
    (dir, q)
}

/// Backdate a running job file so the reclaim pass sees it as stale.
fn backdate(q: &FileQueue, job_id: &str, age: Duration) {
    let path = q
        .find_job_files(JobFolder::Running, job_id)
        .unwrap()
        .pop()
        .unwrap();
    let old = SystemTime::now() - age;
    let file = File::options().append(true).open(path).unwrap();
    file.set_modified(old).unwrap();
}

#[test]
fn enqueue_creates_pending_file() {
    let (_dir, q) = queue();
    let id = q.enqueue(&spec("j1")).unwrap();
    assert_eq!(id, "j1");
    assert!(q.folder_dir(JobFolder::Pending).join("j1.json").exists());
    assert_eq!(q.locate("j1").unwrap(), Some(JobFolder::Pending));
}

#[test]
fn enqueue_round_trips_spec_bytes() {
    let (_dir, q) = queue();
    let original = spec("j1");
    q.enqueue(&original).unwrap();
    let read_back = q.read_spec_in(JobFolder::Pending, "j1").unwrap();
    assert_eq!(
        serde_json::to_string(&read_back).unwrap(),
        serde_json::to_string(&original).unwrap()
    );
}

#[test]
fn duplicate_enqueue_rejected_in_every_folder() {
    let (_dir, q) = queue();
    q.enqueue(&spec("j1")).unwrap();
    assert!(matches!(
        q.enqueue(&spec("j1")),
        Err(QueueError::DuplicateJob(_))
    ));

    // even after the job is done
    let claimed = q.claim().unwrap();
    q.complete(&claimed.job_id, Terminal::Done).unwrap();
    assert!(matches!(
        q.enqueue(&spec("j1")),
        Err(QueueError::DuplicateJob(_))
    ));
}

#[test]
fn find_job_files_requires_literal_dot_separator() {
    let (_dir, q) = queue();
    q.enqueue(&spec("job-1")).unwrap();
    q.enqueue(&spec("job-12")).unwrap();

    // a suffixed collision file for job-1
    let suffixed = q.folder_dir(JobFolder::Pending).join("job-1.12345.json");
    std::fs::write(&suffixed, serde_json::to_string(&spec("job-1")).unwrap()).unwrap();

    let found: Vec<String> = q
        .find_job_files(JobFolder::Pending, "job-1")
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(found, vec!["job-1.12345.json", "job-1.json"]);
}

#[test]
fn invalid_job_ids_rejected_at_enqueue() {
    let (_dir, q) = queue();
    assert!(matches!(
        q.enqueue(&spec("a/b")),
        Err(QueueError::InvalidJobId(_))
    ));
    assert!(matches!(
        q.enqueue(&spec(".hidden")),
        Err(QueueError::InvalidJobId(_))
    ));
}

#[test]
fn claim_moves_oldest_job_to_running() {
    let (_dir, q) = queue();
    q.enqueue(&spec("j1")).unwrap();
    let claimed = q.claim().unwrap();
    assert_eq!(claimed.job_id, "j1");
    assert_eq!(q.locate("j1").unwrap(), Some(JobFolder::Running));
    assert!(matches!(q.claim(), Err(QueueError::Empty)));
}

#[test]
fn claim_on_empty_queue_reports_empty() {
    let (_dir, q) = queue();
    assert!(matches!(q.claim(), Err(QueueError::Empty)));
}

#[test]
fn claim_parks_unparsable_job_files_in_failed() {
    let (_dir, q) = queue();
    std::fs::write(q.folder_dir(JobFolder::Pending).join("broken.json"), "{nope").unwrap();
    q.enqueue(&spec("good")).unwrap();

    let claimed = q.claim().unwrap();
    assert_eq!(claimed.job_id, "good");
    assert!(q.folder_dir(JobFolder::Failed).join("broken.json").exists());
}

#[test]
fn complete_moves_to_terminal_and_is_idempotent() {
    let (_dir, q) = queue();
    q.enqueue(&spec("j1")).unwrap();
    let claimed = q.claim().unwrap();

    q.complete(&claimed.job_id, Terminal::Done).unwrap();
    assert_eq!(q.locate("j1").unwrap(), Some(JobFolder::Done));

    // repeated success call is a no-op
    q.complete(&claimed.job_id, Terminal::Done).unwrap();

    // a job that is nowhere raises
    assert!(matches!(
        q.complete("ghost", Terminal::Done),
        Err(QueueError::NotFound { .. })
    ));
}

#[test]
fn approve_then_claim_returns_the_job() {
    let (_dir, q) = queue();
    q.enqueue(&spec("j5")).unwrap();
    let claimed = q.claim().unwrap();
    q.complete(&claimed.job_id, Terminal::AwaitingApproval).unwrap();
    assert_eq!(q.locate("j5").unwrap(), Some(JobFolder::AwaitingApproval));

    q.approve("j5").unwrap();
    assert_eq!(q.locate("j5").unwrap(), Some(JobFolder::Pending));
    assert_eq!(q.claim().unwrap().job_id, "j5");
}

#[test]
fn approve_missing_job_raises() {
    let (_dir, q) = queue();
    assert!(matches!(q.approve("nope"), Err(QueueError::NotFound { .. })));
}

#[test]
fn unlock_returns_running_job_to_pending() {
    let (_dir, q) = queue();
    q.enqueue(&spec("j1")).unwrap();
    q.claim().unwrap();
    q.unlock("j1").unwrap();
    assert_eq!(q.locate("j1").unwrap(), Some(JobFolder::Pending));
}

#[test]
fn fresh_running_jobs_are_not_reclaimed() {
    let (_dir, q) = queue();
    q.enqueue(&spec("j1")).unwrap();
    q.claim().unwrap();

    let outcome = q
        .reclaim_stale_running(Duration::from_secs(600), 3)
        .unwrap();
    assert!(outcome.requeued.is_empty());
    assert!(outcome.exhausted.is_empty());
}

#[test]
fn stale_running_jobs_return_to_pending_with_counter() {
    let (_dir, q) = queue();
    q.enqueue(&spec("j4")).unwrap();
    q.claim().unwrap();
    backdate(&q, "j4", Duration::from_secs(3600));

    let outcome = q
        .reclaim_stale_running(Duration::from_secs(600), 3)
        .unwrap();
    assert_eq!(outcome.requeued, vec!["j4"]);
    assert_eq!(q.locate("j4").unwrap(), Some(JobFolder::Pending));
    assert!(q.root().join("j4.attempts").exists());
}

#[test]
fn reclaim_budget_exhaustion_moves_job_to_failed() {
    let (_dir, q) = queue();
    q.enqueue(&spec("j4")).unwrap();

    for round in 0..4 {
        match q.claim() {
            Ok(_) => {}
            Err(QueueError::Empty) => panic!("job lost in round {round}"),
            Err(e) => panic!("{e}"),
        }
        backdate(&q, "j4", Duration::from_secs(3600));
        let outcome = q
            .reclaim_stale_running(Duration::from_secs(600), 3)
            .unwrap();
        if round < 3 {
            assert_eq!(outcome.requeued, vec!["j4"], "round {round}");
        } else {
            assert_eq!(outcome.exhausted, vec!["j4"]);
            assert_eq!(q.locate("j4").unwrap(), Some(JobFolder::Failed));
            // counter cleaned up with the terminal move
            assert!(!q.root().join("j4.attempts").exists());
        }
    }
}

#[test]
fn concurrent_claims_hand_each_job_to_exactly_one_caller() {
    let (_dir, q) = queue();
    let n_jobs = 40;
    for i in 0..n_jobs {
        q.enqueue(&spec(&format!("job-{i}"))).unwrap();
    }

    let root = q.root().to_path_buf();
    let mut handles = Vec::new();
    for _ in 0..4 {
        let root = root.clone();
        handles.push(std::thread::spawn(move || {
            let q = FileQueue::new(root).unwrap();
            let mut claimed = Vec::new();
            loop {
                match q.claim() {
                    Ok(job) => claimed.push(job.job_id),
                    Err(QueueError::Empty) => break claimed,
                    Err(e) => panic!("{e}"),
                }
            }
        }));
    }

    let mut all: Vec<String> = Vec::new();
    for handle in handles {
        all.extend(handle.join().unwrap());
    }
    assert_eq!(all.len(), n_jobs, "every job claimed exactly once");
    let unique: HashSet<&String> = all.iter().collect();
    assert_eq!(unique.len(), n_jobs);
}

#[test]
fn job_ids_with_dots_survive_the_lifecycle() {
    let (_dir, q) = queue();
    q.enqueue(&spec("release-1.2.3")).unwrap();
    let claimed = q.claim().unwrap();
    assert_eq!(claimed.job_id, "release-1.2.3");
    q.complete("release-1.2.3", Terminal::Done).unwrap();
    assert_eq!(q.locate("release-1.2.3").unwrap(), Some(JobFolder::Done));
}
