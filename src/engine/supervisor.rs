// src/engine/supervisor.rs

//! The supervisor: one managed process kept in line with two independent
//! change sources.
//!
//! ```text
//!  file watcher ──(ChangeEvent)──┐
//!                                ├──> Debouncer ──> ProcessLifecycle::restart
//!  binding poll ──(changed keys)─┘        (stop, then start)
//! ```
//!
//! Both sources feed the same debouncer, so a file save and a simultaneous
//! secret rotation collapse into a single restart.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::bindings::BindingResolver;
use crate::credentials::CredentialProvider;
use crate::errors::Result;
use crate::exec::{ProcessManager, ProcessRef};
use crate::types::TriggerReason;
use crate::watch::{spawn_watcher, ChangeEvent, WatchFilter, WatcherHandle};

use super::context::DeploymentContext;
use super::debounce::{DebounceHandle, Debouncer};
use super::lifecycle::ProcessLifecycle;
use super::reconcile::{BindingSet, ReconcileOutcome, Reconciler};
use super::spec::ManagedProcessSpec;
use super::{RestartOutcome, RunOutcome, StopOutcome, SupervisorState};

/// Quiet window for restart coalescing.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(3000);

/// Period of the binding reconciliation timer.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    pub debounce: Duration,
    pub poll_interval: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// External capabilities the supervisor depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub manager: Arc<dyn ProcessManager>,
    pub resolver: Arc<dyn BindingResolver>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub context: DeploymentContext,
}

pub struct Supervisor {
    lifecycle: Arc<ProcessLifecycle>,
    reconciler: Arc<Reconciler>,
    restarter: Debouncer<RestartOutcome>,
    context: DeploymentContext,
    /// Binding poll timer and change forwarders; aborted on drop.
    tasks: Vec<JoinHandle<()>>,
    watcher: Option<WatcherHandle>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("lifecycle", &self.lifecycle)
            .field("reconciler", &self.reconciler)
            .field("watcher", &self.watcher)
            .finish_non_exhaustive()
    }
}

/// One reconciliation pass followed, if anything changed, by a debounced
/// restart request.
async fn reconcile_and_schedule(
    lifecycle: &ProcessLifecycle,
    reconciler: &Reconciler,
    restarter: &DebounceHandle<RestartOutcome>,
) -> Result<ReconcileOutcome> {
    let outcome = reconciler.pass(lifecycle).await?;
    if outcome.is_changed() {
        info!(
            identity = %lifecycle.identity(),
            trigger = TriggerReason::BindingChange.as_str(),
            "restart scheduled"
        );
        restarter.trigger();
    }
    Ok(outcome)
}

impl Supervisor {
    /// Build the supervisor and start its binding poll timer.
    ///
    /// Must be called inside a Tokio runtime. The process itself is not
    /// started until [`Supervisor::run`].
    pub fn new(
        spec: ManagedProcessSpec,
        collaborators: Collaborators,
        options: SupervisorOptions,
    ) -> Self {
        let Collaborators {
            manager,
            resolver,
            credentials,
            context,
        } = collaborators;

        let lifecycle = Arc::new(ProcessLifecycle::new(
            spec,
            manager,
            credentials,
            context.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(resolver));

        let restarter = {
            let lifecycle = Arc::clone(&lifecycle);
            Debouncer::spawn(options.debounce, move || {
                let lifecycle = Arc::clone(&lifecycle);
                async move { lifecycle.restart().await }
            })
        };

        let mut supervisor = Self {
            lifecycle,
            reconciler,
            restarter,
            context,
            tasks: Vec::new(),
            watcher: None,
        };
        supervisor.spawn_binding_poll(options.poll_interval);
        supervisor
    }

    fn spawn_binding_poll(&mut self, period: Duration) {
        if period.is_zero() {
            warn!(identity = %self.identity(), "poll interval is zero; binding poll disabled");
            return;
        }

        let lifecycle = Arc::clone(&self.lifecycle);
        let reconciler = Arc::clone(&self.reconciler);
        let restarter = self.restarter.handle();

        self.tasks.push(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(err) = reconcile_and_schedule(&lifecycle, &reconciler, &restarter).await {
                    warn!(
                        identity = %lifecycle.identity(),
                        error = %err,
                        "binding reconciliation skipped this cycle"
                    );
                }
            }
        }));
    }

    /// Route a stream of file changes into the debounced restart.
    ///
    /// Returns `false` (and installs nothing) in removal mode.
    pub fn watch_changes(&mut self, mut changes: mpsc::Receiver<ChangeEvent>) -> bool {
        if self.context.is_removing() {
            info!(identity = %self.identity(), "teardown mode; file watching disabled");
            return false;
        }

        let identity = self.identity();
        let restarter = self.restarter.handle();

        self.tasks.push(tokio::spawn(async move {
            while let Some(change) = changes.recv().await {
                info!(
                    identity = %identity,
                    path = %change.relative,
                    trigger = TriggerReason::FileChange.as_str(),
                    "change detected; restart scheduled"
                );
                if !restarter.trigger() {
                    break;
                }
            }
            debug!(identity = %identity, "change stream closed");
        }));
        true
    }

    /// Watch the process working directory (dot-paths and `filter` excludes
    /// ignored). Returns `Ok(false)` in removal mode.
    pub fn watch_directory(&mut self, filter: WatchFilter) -> Result<bool> {
        if self.context.is_removing() {
            info!(identity = %self.identity(), "teardown mode; file watching disabled");
            return Ok(false);
        }

        let root = self.lifecycle.spec().cwd;
        let (handle, changes) = spawn_watcher(root, filter)?;
        self.watcher = Some(handle);
        Ok(self.watch_changes(changes))
    }

    pub fn identity(&self) -> String {
        self.lifecycle.identity()
    }

    pub fn state(&self) -> SupervisorState {
        self.lifecycle.state()
    }

    pub fn context(&self) -> &DeploymentContext {
        &self.context
    }

    /// Current environment mapping (explicit env plus reconciled bindings).
    pub fn environment(&self) -> BTreeMap<String, String> {
        self.lifecycle.environment()
    }

    pub fn bindings(&self) -> BindingSet {
        self.reconciler.bindings()
    }

    pub async fn is_running(&self) -> Result<bool> {
        self.lifecycle.is_running().await
    }

    pub async fn start(&self) -> Result<ProcessRef> {
        self.lifecycle.start().await
    }

    pub async fn stop(&self) -> Result<Option<StopOutcome>> {
        self.lifecycle.stop().await
    }

    /// Request a debounced restart and wait for the execution covering it.
    ///
    /// `None` if the supervisor is shutting down.
    pub async fn restart(&self) -> Option<RestartOutcome> {
        info!(
            identity = %self.identity(),
            trigger = TriggerReason::Manual.as_str(),
            "restart requested"
        );
        self.restarter.call().await
    }

    /// Fire-and-forget variant of [`Supervisor::restart`].
    pub fn request_restart(&self) -> bool {
        self.restarter.trigger()
    }

    /// Session entry point.
    ///
    /// In removal mode: best-effort stop, errors logged and swallowed.
    /// Otherwise: start the process (replacing one left running under the
    /// same identity); start errors propagate.
    pub async fn run(&self) -> Result<RunOutcome> {
        let identity = self.identity();

        if self.context.is_removing() {
            info!(identity = %identity, "teardown mode; stopping process");
            let stopped = match self.lifecycle.stop().await {
                Ok(stopped) => stopped,
                Err(err) => {
                    error!(identity = %identity, error = %err, "teardown stop failed");
                    None
                }
            };
            return Ok(RunOutcome::TornDown(stopped));
        }

        let process = self.lifecycle.launch().await?;
        Ok(RunOutcome::Started(process))
    }

    /// Track a binding and reconcile immediately.
    ///
    /// `value` seeds the environment only if the key has no value yet; the
    /// resolver's value wins from the first successful pass on. The key stays
    /// tracked even if this pass fails to fetch.
    pub async fn add_environment(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<ReconcileOutcome> {
        let key = key.into();
        let value = value.into();

        if self.reconciler.register(key.clone()) {
            debug!(identity = %self.identity(), key = %key, "tracking binding");
        }
        self.lifecycle.with_env(|env| {
            env.entry(key).or_insert(value);
        });

        self.reconcile().await
    }

    /// Run one reconciliation pass now.
    pub async fn reconcile(&self) -> Result<ReconcileOutcome> {
        reconcile_and_schedule(&self.lifecycle, &self.reconciler, &self.restarter.handle()).await
    }

    /// Cancel the poll timer, the watcher and the debouncer. The managed
    /// process is left as it is.
    pub fn shutdown(self) {
        info!(identity = %self.identity(), "supervisor shutting down");
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.watcher.take();
    }
}
