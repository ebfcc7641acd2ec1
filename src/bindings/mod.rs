// src/bindings/mod.rs

//! Binding resolution: fetch the current values of externally-managed
//! configuration (secrets, resource endpoints) for the active stage.
//!
//! Resolvers are pure queries. They may be slow or fail transiently; the
//! supervisor treats a failure as "skip this reconciliation cycle".

pub mod command;
pub mod file;
pub mod parse;

use std::collections::BTreeMap;

use crate::errors::Result;
use crate::types::BoxFuture;

pub use command::CommandBindingResolver;
pub use file::FileBindingResolver;
pub use parse::parse_env_lines;

/// Resolved binding values keyed by name.
pub type BindingValues = BTreeMap<String, String>;

/// Source of the current resolved binding values.
pub trait BindingResolver: Send + Sync {
    /// Fetch every currently resolved key/value pair. Missing keys are not an
    /// error; callers decide how to treat them.
    fn resolve(&self) -> BoxFuture<'_, Result<BindingValues>>;
}

/// Resolver returning a fixed map. Used when no source is configured.
#[derive(Debug, Clone, Default)]
pub struct StaticBindingResolver {
    values: BindingValues,
}

impl StaticBindingResolver {
    pub fn new(values: BindingValues) -> Self {
        Self { values }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl BindingResolver for StaticBindingResolver {
    fn resolve(&self) -> BoxFuture<'_, Result<BindingValues>> {
        Box::pin(async move { Ok(self.values.clone()) })
    }
}
