// src/watch/watcher.rs

use std::path::PathBuf;

use anyhow::{Context, Result};
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::path_utils::relative_str;
use super::patterns::WatchFilter;

/// A relevant filesystem change under the watched root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Absolute path as reported by the OS.
    pub path: PathBuf,
    /// Path relative to the watched root, forward slashes.
    pub relative: String,
}

/// Handle for the filesystem watcher.
///
/// Keeps the underlying `RecommendedWatcher` alive. Dropping this handle
/// stops file watching and, once drained, closes the event stream.
pub struct WatcherHandle {
    root: PathBuf,
    _inner: RecommendedWatcher,
}

impl WatcherHandle {
    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// Content-affecting events only; access and metadata-only changes would
/// otherwise cause restart loops when the service touches its own files.
fn is_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

/// Watch `root` recursively and stream every non-ignored change.
///
/// The stream is unbounded in time: it only ends when the returned handle is
/// dropped.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    filter: WatchFilter,
) -> Result<(WatcherHandle, mpsc::Receiver<ChangeEvent>)> {
    let root = root.into();
    // Canonicalize once so we have a stable base path.
    let root = root.canonicalize().unwrap_or(root);

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = event_tx.send(event) {
                    // The async side is gone; nothing to forward to.
                    eprintln!("localsvc: failed to forward notify event: {err}");
                }
            }
            Err(err) => {
                eprintln!("localsvc: file watch error: {err}");
            }
        },
        Config::default(),
    )
    .context("creating file watcher")?;

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("watching {:?}", root))?;

    info!("file watcher started on {:?}", root);

    let (change_tx, change_rx) = mpsc::channel::<ChangeEvent>(256);
    let async_root = root.clone();

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if !is_change(&event.kind) {
                continue;
            }

            for path in event.paths {
                let Some(relative) = relative_str(&async_root, &path) else {
                    warn!(
                        "could not relativize path {:?} against root {:?}",
                        path, async_root
                    );
                    continue;
                };

                if filter.is_ignored(&relative) {
                    debug!(rel = %relative, "ignoring change");
                    continue;
                }

                if change_tx.send(ChangeEvent { path, relative }).await.is_err() {
                    debug!("change consumer closed; stopping watcher loop");
                    return;
                }
            }
        }
        debug!("watcher event loop finished");
    });

    Ok((
        WatcherHandle {
            root,
            _inner: watcher,
        },
        change_rx,
    ))
}
