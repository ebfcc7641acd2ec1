// src/bindings/file.rs

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::errors::{LocalsvcError, Result};
use crate::fs::FileSystem;
use crate::types::BoxFuture;

use super::{parse_env_lines, BindingResolver, BindingValues};

/// Reads a dotenv-style file on every resolve, so edits (or a sync job
/// rewriting it) show up on the next poll.
#[derive(Debug, Clone)]
pub struct FileBindingResolver {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl FileBindingResolver {
    pub fn new(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl BindingResolver for FileBindingResolver {
    fn resolve(&self) -> BoxFuture<'_, Result<BindingValues>> {
        Box::pin(async move {
            if !self.fs.exists(&self.path) {
                return Err(LocalsvcError::BindingFetchError(format!(
                    "binding file {:?} does not exist",
                    self.path
                )));
            }

            let contents = self
                .fs
                .read_to_string(&self.path)
                .map_err(|e| LocalsvcError::BindingFetchError(format!("{e:#}")))?;

            let values = parse_env_lines(&contents);
            debug!(path = ?self.path, keys = values.len(), "resolved bindings from file");
            Ok(values)
        })
    }
}
