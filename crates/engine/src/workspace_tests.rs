// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::Settings;
use tempfile::TempDir;

fn manager(base: &Path) -> WorkspaceManager {
    let mut settings = Settings::rooted(base);
    settings
        .project_aliases
        .insert("demo".to_string(), base.join("repos/demo"));
    WorkspaceManager::new(&settings).unwrap()
}

#[tokio::test]
async fn fresh_workspace_for_dot_workdir() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(dir.path());
    assert_eq!(mgr.resolve_source(".").unwrap(), None);

    let layout = mgr.prepare("j1", None).await.unwrap();
    assert!(layout.workdir.is_dir());
    assert!(layout.workdir.ends_with("j1/work"));
    assert!(layout.workdir.starts_with(mgr.root()));
}

#[tokio::test]
async fn alias_resolution_requires_existing_dir() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(dir.path());

    assert!(matches!(
        mgr.resolve_source("demo"),
        Err(WorkspaceError::MissingSource(_))
    ));
    std::fs::create_dir_all(dir.path().join("repos/demo")).unwrap();
    assert!(mgr.resolve_source("demo").unwrap().is_some());
    assert!(matches!(
        mgr.resolve_source("nope"),
        Err(WorkspaceError::UnknownProject(_))
    ));
}

#[tokio::test]
async fn absolute_workdir_honors_the_escape_hatch() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("src-repo");
    std::fs::create_dir_all(&source).unwrap();

    let mut settings = Settings::rooted(dir.path());
    settings.allow_absolute_workdir = false;
    let mgr = WorkspaceManager::new(&settings).unwrap();
    assert!(matches!(
        mgr.resolve_source(source.to_str().unwrap()),
        Err(WorkspaceError::AbsoluteWorkdirForbidden)
    ));

    settings.allow_absolute_workdir = true;
    let mgr = WorkspaceManager::new(&settings).unwrap();
    assert_eq!(
        mgr.resolve_source(source.to_str().unwrap()).unwrap(),
        Some(source)
    );
}

#[tokio::test]
async fn non_git_source_is_copied() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("plain");
    std::fs::create_dir_all(source.join("sub")).unwrap();
    std::fs::write(source.join("file.txt"), "content").unwrap();
    std::fs::write(source.join("sub/inner.txt"), "inner").unwrap();

    let mgr = manager(dir.path());
    let layout = mgr.prepare("j1", Some(&source)).await.unwrap();
    assert_eq!(
        std::fs::read_to_string(layout.workdir.join("file.txt")).unwrap(),
        "content"
    );
    assert_eq!(
        std::fs::read_to_string(layout.workdir.join("sub/inner.txt")).unwrap(),
        "inner"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_source_entries_are_refused() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("plain");
    std::fs::create_dir_all(&source).unwrap();
    std::os::unix::fs::symlink("/etc", source.join("evil")).unwrap();

    let mgr = manager(dir.path());
    assert!(matches!(
        mgr.prepare("j1", Some(&source)).await,
        Err(WorkspaceError::SymlinkRejected(_))
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_workspace_component_fails_the_job() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(dir.path());
    let outside = dir.path().join("outside");
    std::fs::create_dir_all(&outside).unwrap();
    std::os::unix::fs::symlink(&outside, mgr.root().join("j1")).unwrap();

    assert!(matches!(
        mgr.prepare("j1", None).await,
        Err(WorkspaceError::SymlinkRejected(_))
    ));
}

#[tokio::test]
async fn job_id_with_separators_is_refused() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(dir.path());
    for bad in ["a/b", "a\\b", "a..b", ""] {
        assert!(
            matches!(
                mgr.prepare(bad, None).await,
                Err(WorkspaceError::InvalidJobId(_))
            ),
            "{bad:?} accepted"
        );
    }
}

#[tokio::test]
async fn existing_nonempty_workspace_is_reused() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(dir.path());
    let layout = mgr.prepare("j1", None).await.unwrap();
    std::fs::write(layout.workdir.join("work-in-progress.txt"), "wip").unwrap();

    // resume path: second prepare keeps the working copy
    let again = mgr.prepare("j1", None).await.unwrap();
    assert!(again.workdir.join("work-in-progress.txt").exists());
}
