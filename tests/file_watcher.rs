// tests/file_watcher.rs

mod common;
use crate::common::{init_tracing, TestResult};

use std::fs;
use std::time::Duration;

use tokio::time::timeout;

use localsvc::engine::RestartOutcome;
use localsvc::watch::{is_hidden, spawn_watcher, WatchFilter};
use localsvc_test_utils::{debounce_only, Rig, SpecBuilder};

#[test]
fn dot_paths_are_hidden() {
    assert!(is_hidden(".git/HEAD"));
    assert!(is_hidden("src/.cache/x"));
    assert!(is_hidden(".env"));
    assert!(!is_hidden("src/main.ts"));
    assert!(!is_hidden("./src/main.ts"));
    assert!(!is_hidden("../sibling/file"));
}

#[test]
fn filter_combines_hidden_and_excludes() -> TestResult {
    let filter = WatchFilter::new(&["node_modules/**", "**/*.log"])?;

    assert!(filter.is_ignored(""));
    assert!(filter.is_ignored(".git/index"));
    assert!(filter.is_ignored("node_modules/pkg/index.js"));
    assert!(filter.is_ignored("logs/app.log"));
    assert!(!filter.is_ignored("src/app.ts"));
    assert_eq!(filter.exclude_patterns(), ["node_modules/**", "**/*.log"]);

    assert!(!WatchFilter::default().is_ignored("anything.log"));
    Ok(())
}

#[test]
fn invalid_exclude_pattern_is_rejected() {
    assert!(WatchFilter::new(&["src/[oops"]).is_err());
}

#[tokio::test]
async fn watcher_reports_visible_changes_only() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    fs::create_dir_all(dir.path().join(".git"))?;
    fs::create_dir_all(dir.path().join("tmp"))?;

    let filter = WatchFilter::new(&["tmp/**"])?;
    let (handle, mut changes) = spawn_watcher(dir.path(), filter)?;
    assert!(handle.root().is_absolute());

    // give the OS watcher a moment to arm
    tokio::time::sleep(Duration::from_millis(200)).await;

    fs::write(dir.path().join(".git/HEAD"), "ref")?;
    fs::write(dir.path().join("tmp/scratch"), "x")?;
    fs::write(dir.path().join("main.ts"), "console.log(1)")?;

    let event = timeout(Duration::from_secs(5), changes.recv())
        .await?
        .ok_or("change stream closed")?;
    assert_eq!(event.relative, "main.ts");

    // anything else that arrives must also be for main.ts
    while let Ok(Some(more)) = timeout(Duration::from_millis(300), changes.recv()).await {
        assert_eq!(more.relative, "main.ts");
    }
    Ok(())
}

#[tokio::test]
async fn dropping_the_handle_closes_the_stream() -> TestResult {
    let dir = tempfile::tempdir()?;
    let (handle, mut changes) = spawn_watcher(dir.path(), WatchFilter::default())?;
    drop(handle);

    let closed = timeout(Duration::from_secs(5), async {
        while changes.recv().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok());
    Ok(())
}

#[tokio::test]
async fn saving_a_file_restarts_the_supervised_process() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let rig = Rig::new();
    let mut sup = rig.supervisor_with(
        SpecBuilder::new("dev-web").cwd(dir.path()).build(),
        debounce_only(Duration::from_millis(200)),
    );
    sup.run().await?;
    assert!(sup.watch_directory(WatchFilter::default())?);
    tokio::time::sleep(Duration::from_millis(200)).await;

    fs::write(dir.path().join("index.js"), "module.exports = 1")?;

    let restarted = timeout(Duration::from_secs(5), async {
        while rig.manager.start_count() < 2 {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await;
    assert!(restarted.is_ok(), "no restart after a file save");

    let outcome = sup.restart().await;
    assert!(matches!(outcome, Some(RestartOutcome::Restarted { .. })));
    Ok(())
}
