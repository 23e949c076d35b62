// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The filesystem queue: `pending/ → running/ → done/ | failed/ |
//! awaiting_approval/`.
//!
//! One JSON file per job, stem `<job_id>.json` with an optional
//! disambiguating `<job_id>.<suffix>.json` form that lookups must
//! tolerate. Job files are never edited in place after enqueue; the only
//! mutations are renames between the five folders. Reclaim counters live
//! in `<job_id>.attempts` side-files directly under the queue root so
//! they survive folder moves.

use gantry_core::{validate_job_id, JobSpec};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is empty")]
    Empty,
    #[error("duplicate job '{0}'")]
    DuplicateJob(String),
    #[error("job '{job_id}' not found in {folder}/")]
    NotFound { job_id: String, folder: &'static str },
    #[error("invalid job id: {0}")]
    InvalidJobId(#[from] gantry_core::ValidationError),
    #[error("job file {path}: {source}")]
    BadJobFile {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Lifecycle folders under the queue root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFolder {
    Pending,
    Running,
    Done,
    Failed,
    AwaitingApproval,
}

impl JobFolder {
    pub const ALL: [JobFolder; 5] = [
        JobFolder::Pending,
        JobFolder::Running,
        JobFolder::Done,
        JobFolder::Failed,
        JobFolder::AwaitingApproval,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            JobFolder::Pending => "pending",
            JobFolder::Running => "running",
            JobFolder::Done => "done",
            JobFolder::Failed => "failed",
            JobFolder::AwaitingApproval => "awaiting_approval",
        }
    }

    /// Done and failed are final; jobs anywhere else are still owned by
    /// the system.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobFolder::Done | JobFolder::Failed)
    }
}

/// Where a finished job lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Done,
    Failed,
    AwaitingApproval,
}

impl Terminal {
    fn folder(&self) -> JobFolder {
        match self {
            Terminal::Done => JobFolder::Done,
            Terminal::Failed => JobFolder::Failed,
            Terminal::AwaitingApproval => JobFolder::AwaitingApproval,
        }
    }
}

/// A successfully claimed job: parsed spec plus its path in `running/`.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job_id: String,
    pub spec: JobSpec,
    pub path: PathBuf,
}

/// Result of one reclaim pass over `running/`.
#[derive(Debug, Default)]
pub struct ReclaimOutcome {
    /// Jobs moved back to `pending/`.
    pub requeued: Vec<String>,
    /// Jobs whose reclaim budget ran out; moved to `failed/`. The caller
    /// owns writing a synthesized result for them.
    pub exhausted: Vec<String>,
}

#[derive(Debug)]
pub struct FileQueue {
    root: PathBuf,
}

impl FileQueue {
    /// Open (and create) the queue directory tree.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let root = root.into();
        for folder in JobFolder::ALL {
            fs::create_dir_all(root.join(folder.dir_name()))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn folder_dir(&self, folder: JobFolder) -> PathBuf {
        self.root.join(folder.dir_name())
    }

    /// All queue files belonging to `job_id` in one folder: the exact
    /// `<job_id>.json` plus any `<job_id>.<suffix>.json`. The separator
    /// is a literal dot; `job-1` never matches `job-12.json`.
    pub fn find_job_files(&self, folder: JobFolder, job_id: &str) -> Result<Vec<PathBuf>, QueueError> {
        let dir = self.folder_dir(folder);
        let exact = format!("{job_id}.json");
        let dotted = format!("{job_id}.");
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name == exact || (name.starts_with(&dotted) && name.ends_with(".json")) {
                out.push(entry.path());
            }
        }
        out.sort();
        Ok(out)
    }

    /// Folder currently holding the job, if any.
    pub fn locate(&self, job_id: &str) -> Result<Option<JobFolder>, QueueError> {
        for folder in JobFolder::ALL {
            if !self.find_job_files(folder, job_id)?.is_empty() {
                return Ok(Some(folder));
            }
        }
        Ok(None)
    }

    /// Job ids present in one folder.
    ///
    /// Ids are read from the job files themselves; a file stem is only a
    /// fallback for unparsable files (ids may legally contain dots).
    pub fn list_job_ids(&self, folder: JobFolder) -> Result<Vec<String>, QueueError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(self.folder_dir(folder))? {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".json") {
                continue;
            }
            match read_spec(&path) {
                Ok(spec) => out.push(spec.job_id),
                Err(_) => out.push(job_id_of(&path)),
            }
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    /// Durably add a job to `pending/`.
    ///
    /// Fails with [`QueueError::DuplicateJob`] when any folder already
    /// holds a file for this id, wherever the previous instance ended up.
    /// The write is atomic: `<job_id>.json.tmp`, fsync, rename.
    pub fn enqueue(&self, spec: &JobSpec) -> Result<String, QueueError> {
        validate_job_id(&spec.job_id)?;
        let job_id = spec.job_id.clone();

        for folder in JobFolder::ALL {
            if !self.find_job_files(folder, &job_id)?.is_empty() {
                return Err(QueueError::DuplicateJob(job_id));
            }
        }

        let pending = self.folder_dir(JobFolder::Pending);
        let tmp = pending.join(format!("{job_id}.json.tmp"));
        let body = to_pretty_json(spec).map_err(|source| QueueError::BadJobFile {
            path: tmp.clone(),
            source,
        })?;
        {
            let mut file = File::create(&tmp)?;
            file.write_all(body.as_bytes())?;
            file.sync_all()?;
        }

        // A racing producer may have landed the exact name between the
        // probe and this rename; fall back to a dotted suffix rather than
        // silently replacing their file.
        let exact = pending.join(format!("{job_id}.json"));
        let target = if exact.exists() {
            pending.join(format!("{job_id}.{}.json", nanos_now()))
        } else {
            exact
        };
        fs::rename(&tmp, &target)?;
        Ok(job_id)
    }

    /// Claim the oldest pending job by atomically renaming it into
    /// `running/`. A rename lost to another runner just moves on to the
    /// next candidate.
    pub fn claim(&self) -> Result<ClaimedJob, QueueError> {
        let pending = self.folder_dir(JobFolder::Pending);
        let mut candidates: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&pending)? {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".json") {
                continue;
            }
            let mtime = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            candidates.push((mtime, path));
        }
        candidates.sort();

        for (_, path) in candidates {
            let Some(name) = path.file_name().map(|n| n.to_os_string()) else {
                continue;
            };
            let target = self.folder_dir(JobFolder::Running).join(&name);
            if fs::rename(&path, &target).is_err() {
                // Raced by another runner; not an error.
                continue;
            }
            // Rename preserves mtime; stamp the claim time so stale-claim
            // detection measures from now.
            touch(&target);

            match read_spec(&target) {
                Ok(spec) => {
                    return Ok(ClaimedJob {
                        job_id: spec.job_id.clone(),
                        spec,
                        path: target,
                    })
                }
                Err(err) => {
                    let job_id = job_id_of(&target);
                    // Unparsable job file: park it in failed/ and keep
                    // scanning. The producer gets a clear terminal state
                    // instead of an endless claim loop.
                    warn!(job_id = %job_id, error = %err, "unparsable job file, moving to failed/");
                    let failed = self.folder_dir(JobFolder::Failed).join(&name);
                    fs::rename(&target, &failed)?;
                    continue;
                }
            }
        }
        Err(QueueError::Empty)
    }

    /// Move a running job to its terminal folder.
    ///
    /// Idempotent against a repeated call with the same terminal: if the
    /// file is already in the target folder this is a no-op. A job that
    /// is in neither `running/` nor the target raises.
    pub fn complete(&self, job_id: &str, terminal: Terminal) -> Result<(), QueueError> {
        let target_folder = terminal.folder();
        let sources = self.find_job_files(JobFolder::Running, job_id)?;
        if sources.is_empty() {
            if !self.find_job_files(target_folder, job_id)?.is_empty() {
                return Ok(());
            }
            return Err(QueueError::NotFound {
                job_id: job_id.to_string(),
                folder: JobFolder::Running.dir_name(),
            });
        }
        for source in sources {
            let name = source.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            fs::rename(&source, self.folder_dir(target_folder).join(name))?;
        }
        if target_folder.is_terminal() {
            let _ = fs::remove_file(self.attempts_path(job_id));
        }
        Ok(())
    }

    /// Operator action: release an `awaiting_approval/` job back to
    /// `pending/`.
    pub fn approve(&self, job_id: &str) -> Result<(), QueueError> {
        self.move_all(job_id, JobFolder::AwaitingApproval, JobFolder::Pending)
    }

    /// Operator action: force a `running/` job back to `pending/`.
    pub fn unlock(&self, job_id: &str) -> Result<(), QueueError> {
        self.move_all(job_id, JobFolder::Running, JobFolder::Pending)
    }

    fn move_all(
        &self,
        job_id: &str,
        from: JobFolder,
        to: JobFolder,
    ) -> Result<(), QueueError> {
        let sources = self.find_job_files(from, job_id)?;
        if sources.is_empty() {
            return Err(QueueError::NotFound {
                job_id: job_id.to_string(),
                folder: from.dir_name(),
            });
        }
        for source in sources {
            let name = source.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            fs::rename(&source, self.folder_dir(to).join(name))?;
        }
        Ok(())
    }

    /// Return stale `running/` jobs to `pending/`, or to `failed/` once
    /// their durable reclaim budget is spent.
    ///
    /// Staleness is measured by mtime, which [`FileQueue::claim`] stamps
    /// at claim time.
    pub fn reclaim_stale_running(
        &self,
        max_age: Duration,
        max_attempts: u32,
    ) -> Result<ReclaimOutcome, QueueError> {
        let mut outcome = ReclaimOutcome::default();
        let now = SystemTime::now();

        for entry in fs::read_dir(self.folder_dir(JobFolder::Running))? {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".json") {
                continue;
            }
            let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
                continue;
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age < max_age {
                continue;
            }

            let job_id = read_spec(&path)
                .map(|spec| spec.job_id)
                .unwrap_or_else(|_| job_id_of(&path));
            let attempts = self.bump_attempts(&job_id)?;
            if attempts > max_attempts {
                let target = self.folder_dir(JobFolder::Failed).join(name);
                if fs::rename(&path, &target).is_ok() {
                    let _ = fs::remove_file(self.attempts_path(&job_id));
                    outcome.exhausted.push(job_id);
                }
            } else {
                let target = self.folder_dir(JobFolder::Pending).join(name);
                if fs::rename(&path, &target).is_ok() {
                    outcome.requeued.push(job_id);
                }
            }
        }
        Ok(outcome)
    }

    /// Parse the spec for a job currently in `folder`.
    pub fn read_spec_in(&self, folder: JobFolder, job_id: &str) -> Result<JobSpec, QueueError> {
        let files = self.find_job_files(folder, job_id)?;
        let Some(path) = files.first() else {
            return Err(QueueError::NotFound {
                job_id: job_id.to_string(),
                folder: folder.dir_name(),
            });
        };
        read_spec(path)
    }

    fn attempts_path(&self, job_id: &str) -> PathBuf {
        self.root.join(format!("{job_id}.attempts"))
    }

    /// Durably increment the reclaim counter; returns the new count.
    fn bump_attempts(&self, job_id: &str) -> Result<u32, QueueError> {
        let path = self.attempts_path(job_id);
        let current: u32 = fs::read_to_string(&path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);
        let next = current + 1;

        let tmp = path.with_extension("attempts.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(next.to_string().as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(next)
    }
}

/// Best-effort id from a file name; only used when the file itself is
/// unparsable.
fn job_id_of(path: &Path) -> String {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    name.strip_suffix(".json").unwrap_or(name).to_string()
}

fn read_spec(path: &Path) -> Result<JobSpec, QueueError> {
    let body = fs::read_to_string(path)?;
    serde_json::from_str(&body).map_err(|source| QueueError::BadJobFile {
        path: path.to_path_buf(),
        source,
    })
}

fn to_pretty_json(spec: &JobSpec) -> Result<String, serde_json::Error> {
    let mut body = serde_json::to_string_pretty(spec)?;
    body.push('\n');
    Ok(body)
}

fn touch(path: &Path) {
    if let Ok(file) = OpenOptions::new().append(true).open(path) {
        let _ = file.set_modified(SystemTime::now());
    }
}

fn nanos_now() -> u128 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
