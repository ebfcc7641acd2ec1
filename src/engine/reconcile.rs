// src/engine/reconcile.rs

//! Binding tracking and reconciliation.
//!
//! A pass fetches the resolver's current values and copies every tracked key
//! whose value differs into the process environment. A key missing from the
//! resolver result counts as "unchanged": the last applied value is kept.
//! This also means a resolver that silently drops keys looks like "nothing
//! changed".

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::bindings::{BindingResolver, BindingValues};
use crate::errors::{LocalsvcError, Result};

use super::lifecycle::ProcessLifecycle;

/// Ordered set of tracked binding keys plus the last value seen for each.
///
/// Only grows during a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingSet {
    keys: Vec<String>,
    observed: BTreeMap<String, String>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `key`. Returns `false` if it was already tracked.
    pub fn register(&mut self, key: impl Into<String>) -> bool {
        let key = key.into();
        if self.keys.contains(&key) {
            return false;
        }
        self.keys.push(key);
        true
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn last_observed(&self, key: &str) -> Option<&str> {
        self.observed.get(key).map(String::as_str)
    }

    /// Record `resolved` and return the tracked keys (in registration order)
    /// whose resolved value differs from `applied`, with their new value.
    pub fn diff(
        &mut self,
        resolved: &BindingValues,
        applied: &BTreeMap<String, String>,
    ) -> Vec<(String, String)> {
        let mut changes = Vec::new();

        for key in &self.keys {
            let Some(value) = resolved.get(key) else {
                continue;
            };
            self.observed.insert(key.clone(), value.clone());
            if applied.get(key) != Some(value) {
                changes.push((key.clone(), value.clone()));
            }
        }

        changes
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Keys whose value was updated, in registration order.
    pub changed: Vec<String>,
}

impl ReconcileOutcome {
    pub fn is_changed(&self) -> bool {
        !self.changed.is_empty()
    }
}

/// Owns the tracked bindings and runs reconciliation passes.
///
/// Passes are serialized so a timer pass and an `add_environment` pass never
/// interleave their fetch and apply steps.
pub struct Reconciler {
    bindings: Mutex<BindingSet>,
    resolver: Arc<dyn BindingResolver>,
    gate: AsyncMutex<()>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("bindings", &*self.lock_bindings())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(resolver: Arc<dyn BindingResolver>) -> Self {
        Self {
            bindings: Mutex::new(BindingSet::new()),
            resolver,
            gate: AsyncMutex::new(()),
        }
    }

    fn lock_bindings(&self) -> MutexGuard<'_, BindingSet> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, key: impl Into<String>) -> bool {
        self.lock_bindings().register(key)
    }

    pub fn bindings(&self) -> BindingSet {
        self.lock_bindings().clone()
    }

    /// Fetch current values and apply changes to the process environment.
    ///
    /// Does not schedule a restart; the caller decides. On a fetch failure
    /// nothing is applied and a `BindingFetchError` is returned.
    pub async fn pass(&self, lifecycle: &ProcessLifecycle) -> Result<ReconcileOutcome> {
        let _gate = self.gate.lock().await;

        let resolved = self.resolver.resolve().await.map_err(|err| match err {
            LocalsvcError::BindingFetchError(_) => err,
            other => LocalsvcError::BindingFetchError(other.to_string()),
        })?;

        let changed: Vec<String> = lifecycle.with_env(|env| {
            let changes = self.lock_bindings().diff(&resolved, env);
            changes
                .into_iter()
                .map(|(key, value)| {
                    env.insert(key.clone(), value);
                    key
                })
                .collect()
        });

        if changed.is_empty() {
            debug!(identity = %lifecycle.identity(), "bindings unchanged");
        } else {
            info!(identity = %lifecycle.identity(), ?changed, "bindings changed");
        }

        Ok(ReconcileOutcome { changed })
    }
}
