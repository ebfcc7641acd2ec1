// src/types.rs

use std::future::Future;
use std::pin::Pin;

/// Boxed, sendable future returned by the async collaborator traits
/// (`ProcessManager`, `BindingResolver`, `CredentialProvider`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Whether the current pass creates/updates the service or tears it down.
///
/// - `Deploy`: normal development session (default).
/// - `Remove`: teardown pass; restarts and watchers become no-ops and
///   `run()` only stops whatever is registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeploymentMode {
    #[default]
    Deploy,
    Remove,
}

/// What caused a restart request. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    /// Filesystem activity under the watched root.
    FileChange,
    /// A tracked binding resolved to a new value.
    BindingChange,
    /// Explicit call to `restart()`.
    Manual,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::FileChange => "file-change",
            TriggerReason::BindingChange => "binding-change",
            TriggerReason::Manual => "manual",
        }
    }
}
