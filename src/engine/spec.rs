// src/engine/spec.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::errors::{ConfigErrorKind, Result};
use crate::exec::{LaunchCommand, RestartPolicy, StartOptions};

/// Definition of the one process a supervisor manages.
///
/// Everything except `env` is fixed for the supervisor's lifetime; `env` is
/// updated in place by binding reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedProcessSpec {
    /// Unique name under which the process manager registers the process.
    pub identity: String,
    /// Working directory; also the root of the file watcher.
    pub cwd: PathBuf,
    pub command: LaunchCommand,
    pub env: BTreeMap<String, String>,
    pub policy: RestartPolicy,
}

impl ManagedProcessSpec {
    pub fn new(identity: impl Into<String>, cwd: impl Into<PathBuf>, command: LaunchCommand) -> Self {
        Self {
            identity: identity.into(),
            cwd: cwd.into(),
            command,
            env: BTreeMap::new(),
            policy: RestartPolicy::default(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_policy(mut self, policy: RestartPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Check the fields `start` cannot do without.
    pub fn validate(&self) -> Result<()> {
        if self.identity.trim().is_empty() {
            return Err(ConfigErrorKind::MissingIdentity.into());
        }
        if self.command.script.trim().is_empty() {
            return Err(ConfigErrorKind::MissingCommand.into());
        }
        Ok(())
    }

    /// Options for one start call.
    ///
    /// `ambient` (credentials, region) forms the base environment; the
    /// definition's own mapping, including reconciled bindings, takes precedence.
    pub fn start_options(&self, ambient: BTreeMap<String, String>) -> Result<StartOptions> {
        self.validate()?;

        let mut env = ambient;
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(StartOptions {
            identity: self.identity.clone(),
            cwd: self.cwd.clone(),
            command: self.command.clone(),
            env,
            policy: self.policy,
        })
    }
}
