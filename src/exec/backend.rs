// src/exec/backend.rs

//! Pluggable process manager abstraction.
//!
//! Production code uses [`super::LocalProcessManager`]; tests provide a fake
//! that records every call so the supervisor's ordering guarantees can be
//! asserted.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::Result;
use crate::types::BoxFuture;

/// How to launch the managed process.
///
/// With an interpreter the process is `interpreter [interpreter_args] script
/// [args]`; without one `script` is executed directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub interpreter: Option<String>,
    pub interpreter_args: Vec<String>,
    pub script: String,
    pub args: Vec<String>,
}

impl LaunchCommand {
    /// Program to execute and its full argument list.
    pub fn program_and_args(&self) -> (String, Vec<String>) {
        match &self.interpreter {
            Some(interpreter) => {
                let mut args = self.interpreter_args.clone();
                args.push(self.script.clone());
                args.extend(self.args.iter().cloned());
                (interpreter.clone(), args)
            }
            None => (self.script.clone(), self.args.clone()),
        }
    }

    /// Human-readable command line (for logs and `--dry-run`).
    pub fn display(&self) -> String {
        let (program, args) = self.program_and_args();
        std::iter::once(program)
            .chain(args)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Crash supervision policy applied by the process manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Respawn the process when it exits on its own.
    pub autorestart: bool,
    /// Initial backoff before a respawn; doubles on repeated crashes.
    pub restart_delay: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            autorestart: true,
            restart_delay: Duration::from_millis(1000),
        }
    }
}

/// Everything the process manager needs to start one named process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOptions {
    pub identity: String,
    pub cwd: PathBuf,
    pub command: LaunchCommand,
    pub env: BTreeMap<String, String>,
    pub policy: RestartPolicy,
}

/// Handle to a process returned by `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRef {
    pub identity: String,
    pub pid: Option<u32>,
}

/// One entry of a `describe` query. `pid` is `None` for a registered but
/// stopped process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDescription {
    pub identity: String,
    pub pid: Option<u32>,
}

/// Trait abstracting the external process manager.
///
/// Every operation may fail with a transient connectivity error. Callers are
/// expected to wrap each action in a `connect` / `disconnect` pair rather
/// than holding a session open.
pub trait ProcessManager: Send + Sync {
    fn connect(&self) -> BoxFuture<'_, Result<()>>;

    fn disconnect(&self) -> BoxFuture<'_, Result<()>>;

    fn start(&self, options: StartOptions) -> BoxFuture<'_, Result<ProcessRef>>;

    /// Stop the process but keep its registration.
    fn stop<'a>(&'a self, identity: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Stop the process (if needed) and drop its registration.
    fn delete<'a>(&'a self, identity: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Registered processes under `identity`; empty if unknown.
    fn describe<'a>(&'a self, identity: &'a str)
        -> BoxFuture<'a, Result<Vec<ProcessDescription>>>;
}
