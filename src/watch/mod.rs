// src/watch/mod.rs

//! File watching.
//!
//! Turns filesystem activity under the service's working directory into a
//! stream of [`ChangeEvent`]s:
//! - [`watcher`] wires up the cross-platform `notify` watcher.
//! - [`patterns`] decides which relative paths are ignored (dot-paths
//!   always, plus configured exclude globs).
//! - [`path_utils`] relativizes event paths against the watched root.
//!
//! It knows nothing about processes; the supervisor decides what a change
//! means.

pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use patterns::{is_hidden, WatchFilter};
pub use watcher::{spawn_watcher, ChangeEvent, WatcherHandle};
