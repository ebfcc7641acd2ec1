// src/engine/mod.rs

//! Supervision engine.
//!
//! This module ties together:
//! - the managed process definition ([`spec`])
//! - the lifecycle state machine: start / stop / liveness / restart body
//!   ([`lifecycle`])
//! - the restart debouncer shared by every trigger source ([`debounce`])
//! - binding tracking and reconciliation ([`reconcile`])
//! - the teardown flag consulted at execution time ([`context`])
//! - the [`Supervisor`] composing all of the above with the file watcher
//!   and the periodic binding poll ([`supervisor`]).

use crate::exec::ProcessRef;

/// Lifecycle state of one supervised process within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Unstarted,
    Running,
    Restarting,
    Stopped,
    /// Both delete and stop failed; the process may or may not be alive.
    Inconsistent,
}

/// Which path `stop()` took for a running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// Registration deleted.
    Removed,
    /// Delete failed; a plain stop succeeded.
    StoppedFallback,
    /// Delete and stop both failed. Only surfaced through logs and state.
    Inconsistent {
        delete_error: String,
        stop_error: String,
    },
}

/// Why a restart execution did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The deployment context is in removal mode.
    TearingDown,
    /// Nothing to restart; the initial start stays authoritative.
    NotRunning,
}

/// Result of one executed (debounced) restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    Skipped(SkipReason),
    Restarted {
        /// `None` if the process disappeared between the liveness check and
        /// the stop.
        stop: Option<StopOutcome>,
        process: ProcessRef,
    },
    /// Stop failed completely; start was not attempted.
    Inconsistent,
    /// The restart aborted; the process is left down until the next trigger.
    Failed(String),
}

/// Result of `Supervisor::run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Started(ProcessRef),
    /// Removal mode: the (best-effort) teardown result. `None` if nothing
    /// was running or the stop failed (failure is logged).
    TornDown(Option<StopOutcome>),
}

pub mod context;
pub mod debounce;
pub mod lifecycle;
pub mod reconcile;
pub mod spec;
pub mod supervisor;

pub use context::DeploymentContext;
pub use debounce::{DebounceHandle, Debouncer};
pub use lifecycle::ProcessLifecycle;
pub use reconcile::{BindingSet, ReconcileOutcome, Reconciler};
pub use spec::ManagedProcessSpec;
pub use supervisor::{
    Collaborators, Supervisor, SupervisorOptions, DEFAULT_DEBOUNCE, DEFAULT_POLL_INTERVAL,
};
