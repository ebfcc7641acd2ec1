// src/watch/patterns.rs

use std::fmt;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// True if any component of the relative path starts with a dot
/// (`.git/HEAD`, `src/.cache/x`, `.env`).
pub fn is_hidden(rel_path: &str) -> bool {
    rel_path
        .split('/')
        .any(|c| c.starts_with('.') && c != "." && c != "..")
}

/// Decides which changed paths are ignored.
///
/// Patterns are matched against paths relative to the watched root, e.g.
/// `"node_modules/**"` or `"**/*.log"`.
#[derive(Clone)]
pub struct WatchFilter {
    exclude: GlobSet,
    exclude_patterns: Vec<String>,
}

impl fmt::Debug for WatchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchFilter")
            .field("exclude", &self.exclude_patterns)
            .finish()
    }
}

impl Default for WatchFilter {
    fn default() -> Self {
        Self {
            exclude: GlobSet::empty(),
            exclude_patterns: Vec::new(),
        }
    }
}

impl WatchFilter {
    /// Compile the exclude globs.
    pub fn new<S: AsRef<str>>(exclude: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in exclude {
            let pattern = pattern.as_ref();
            let glob = Glob::new(pattern)
                .with_context(|| format!("invalid exclude pattern `{pattern}`"))?;
            builder.add(glob);
        }

        Ok(Self {
            exclude: builder.build().context("building exclude glob set")?,
            exclude_patterns: exclude.iter().map(|p| p.as_ref().to_string()).collect(),
        })
    }

    pub fn exclude_patterns(&self) -> &[String] {
        &self.exclude_patterns
    }

    /// Whether a change at `rel_path` should be dropped.
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        rel_path.is_empty() || is_hidden(rel_path) || self.exclude.is_match(rel_path)
    }
}
