// src/engine/lifecycle.rs

//! Lifecycle of one managed process: liveness, start, stop, and the body of
//! a restart.
//!
//! Every process-manager interaction runs inside a scoped session
//! (connect, act, disconnect). The disconnect happens on every exit path and
//! a failure to disconnect is logged without masking the action's result.
//!
//! `start`, `stop`, `launch` and `restart` hold an operation gate for their
//! whole duration, so lifecycle operations on the identity never interleave.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crate::credentials::CredentialProvider;
use crate::errors::{LocalsvcError, Result, SupervisionErrorKind};
use crate::exec::{ProcessManager, ProcessRef};

use super::context::DeploymentContext;
use super::spec::ManagedProcessSpec;
use super::{RestartOutcome, SkipReason, StopOutcome, SupervisorState};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn connect_error(err: LocalsvcError) -> LocalsvcError {
    match err {
        LocalsvcError::SupervisionError(_) => err,
        other => SupervisionErrorKind::ConnectFailed(other.to_string()).into(),
    }
}

fn query_error(err: LocalsvcError) -> LocalsvcError {
    match err {
        LocalsvcError::SupervisionError(SupervisionErrorKind::ConnectFailed(msg))
        | LocalsvcError::SupervisionError(SupervisionErrorKind::QueryFailed(msg)) => {
            SupervisionErrorKind::QueryFailed(msg).into()
        }
        other => SupervisionErrorKind::QueryFailed(other.to_string()).into(),
    }
}

pub struct ProcessLifecycle {
    spec: Mutex<ManagedProcessSpec>,
    state: Mutex<SupervisorState>,
    /// Set when a restart left the process down; the next restart starts it
    /// even though nothing is running.
    recovering: AtomicBool,
    ops: AsyncMutex<()>,
    manager: Arc<dyn ProcessManager>,
    credentials: Arc<dyn CredentialProvider>,
    context: DeploymentContext,
}

impl std::fmt::Debug for ProcessLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessLifecycle")
            .field("identity", &self.identity())
            .field("state", &self.state())
            .field("mode", &self.context.mode())
            .finish_non_exhaustive()
    }
}

impl ProcessLifecycle {
    pub fn new(
        spec: ManagedProcessSpec,
        manager: Arc<dyn ProcessManager>,
        credentials: Arc<dyn CredentialProvider>,
        context: DeploymentContext,
    ) -> Self {
        Self {
            spec: Mutex::new(spec),
            state: Mutex::new(SupervisorState::Unstarted),
            recovering: AtomicBool::new(false),
            ops: AsyncMutex::new(()),
            manager,
            credentials,
            context,
        }
    }

    pub fn identity(&self) -> String {
        lock(&self.spec).identity.clone()
    }

    /// Snapshot of the process definition, including the reconciled environment.
    pub fn spec(&self) -> ManagedProcessSpec {
        lock(&self.spec).clone()
    }

    pub fn environment(&self) -> BTreeMap<String, String> {
        lock(&self.spec).env.clone()
    }

    /// Run `f` with exclusive access to the environment mapping.
    pub fn with_env<R>(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> R) -> R {
        f(&mut lock(&self.spec).env)
    }

    pub fn state(&self) -> SupervisorState {
        *lock(&self.state)
    }

    fn set_state(&self, state: SupervisorState) {
        let mut current = lock(&self.state);
        if *current != state {
            debug!(from = ?*current, to = ?state, "state transition");
            *current = state;
        }
    }

    async fn with_connection<T, F, Fut>(&self, action: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.manager.connect().await.map_err(connect_error)?;
        let result = action().await;
        if let Err(err) = self.manager.disconnect().await {
            warn!(
                identity = %self.identity(),
                error = %err,
                "failed to release process manager connection"
            );
        }
        result
    }

    /// Whether a live pid is registered under the identity.
    ///
    /// An unregistered identity is `false`, not an error.
    pub async fn is_running(&self) -> Result<bool> {
        let identity = self.identity();
        let described = self
            .with_connection(|| self.manager.describe(&identity))
            .await
            .map_err(query_error)?;

        let running = described.first().and_then(|p| p.pid).is_some();
        debug!(identity = %identity, running, "liveness check");
        Ok(running)
    }

    /// Start the process with fresh credentials and the current environment.
    pub async fn start(&self) -> Result<ProcessRef> {
        let _op = self.ops.lock().await;
        self.start_locked().await
    }

    /// Start the process, first replacing an instance left running under the
    /// same identity.
    pub async fn launch(&self) -> Result<ProcessRef> {
        let _op = self.ops.lock().await;
        if self.is_running().await? {
            info!(identity = %self.identity(), "found a running instance; replacing it");
            self.stop_locked().await?;
        }
        self.start_locked().await
    }

    async fn start_locked(&self) -> Result<ProcessRef> {
        let spec = self.spec();
        spec.validate()?;

        let ambient = self.credentials.credentials().await?.into_env();
        let options = spec.start_options(ambient)?;

        info!(
            identity = %spec.identity,
            command = %options.command.display(),
            cwd = ?options.cwd,
            "starting process"
        );

        let process = self
            .with_connection(move || self.manager.start(options))
            .await?;

        self.set_state(SupervisorState::Running);
        self.recovering.store(false, Ordering::SeqCst);
        info!(identity = %process.identity, pid = ?process.pid, "process started");
        Ok(process)
    }

    /// Stop the process if it is running.
    ///
    /// `Ok(None)` when nothing was running; no delete or stop is issued.
    pub async fn stop(&self) -> Result<Option<StopOutcome>> {
        let _op = self.ops.lock().await;
        self.stop_locked().await
    }

    async fn stop_locked(&self) -> Result<Option<StopOutcome>> {
        self.recovering.store(false, Ordering::SeqCst);
        let outcome = self.stop_inner().await?;
        match &outcome {
            Some(StopOutcome::Inconsistent { .. }) => self.set_state(SupervisorState::Inconsistent),
            Some(_) => self.set_state(SupervisorState::Stopped),
            None => {}
        }
        Ok(outcome)
    }

    async fn stop_inner(&self) -> Result<Option<StopOutcome>> {
        let identity = self.identity();

        if !self.is_running().await? {
            info!(identity = %identity, "process does not exist; nothing to stop");
            return Ok(None);
        }

        let outcome = self
            .with_connection(|| async { Ok::<_, LocalsvcError>(self.remove_or_stop(&identity).await) })
            .await?;
        Ok(Some(outcome))
    }

    /// Delete the registration; fall back to a plain stop if that fails.
    async fn remove_or_stop(&self, identity: &str) -> StopOutcome {
        let delete_err = match self.manager.delete(identity).await {
            Ok(()) => {
                info!(identity, "process removed");
                return StopOutcome::Removed;
            }
            Err(err) => err,
        };

        let cleanup = LocalsvcError::CleanupError {
            identity: identity.to_string(),
            reason: delete_err.to_string(),
        };
        warn!(identity, error = %cleanup, "falling back to plain stop");

        match self.manager.stop(identity).await {
            Ok(()) => {
                info!(identity, "process stopped");
                StopOutcome::StoppedFallback
            }
            Err(stop_err) => {
                error!(
                    identity,
                    delete_error = %delete_err,
                    stop_error = %stop_err,
                    "delete and stop both failed; process state is inconsistent"
                );
                StopOutcome::Inconsistent {
                    delete_error: delete_err.to_string(),
                    stop_error: stop_err.to_string(),
                }
            }
        }
    }

    /// Body of one (already debounced) restart: stop, then start.
    ///
    /// Never retries. A failed restart leaves the process down until the next
    /// trigger, which then starts it even though nothing is running.
    pub async fn restart(&self) -> RestartOutcome {
        let _op = self.ops.lock().await;
        let identity = self.identity();

        if self.context.is_removing() {
            info!(identity = %identity, "teardown in progress; dropping restart");
            return RestartOutcome::Skipped(SkipReason::TearingDown);
        }

        match self.is_running().await {
            Ok(true) => {}
            Ok(false) if self.recovering.load(Ordering::SeqCst) => {
                info!(identity = %identity, "previous restart left the process down; starting it");
                return match self.start_locked().await {
                    Ok(process) => RestartOutcome::Restarted { stop: None, process },
                    Err(err) => {
                        self.set_state(SupervisorState::Stopped);
                        error!(identity = %identity, error = %err, "recovery start failed");
                        RestartOutcome::Failed(err.to_string())
                    }
                };
            }
            Ok(false) => {
                debug!(identity = %identity, "process not running; nothing to restart");
                return RestartOutcome::Skipped(SkipReason::NotRunning);
            }
            Err(err) => {
                error!(identity = %identity, error = %err, "liveness check failed; restart abandoned");
                return RestartOutcome::Failed(err.to_string());
            }
        }

        info!(identity = %identity, "restarting process");
        self.set_state(SupervisorState::Restarting);

        let stop = match self.stop_inner().await {
            Ok(Some(StopOutcome::Inconsistent { .. })) => {
                self.set_state(SupervisorState::Inconsistent);
                self.recovering.store(true, Ordering::SeqCst);
                error!(identity = %identity, "restart aborted; not starting a second instance");
                return RestartOutcome::Inconsistent;
            }
            Ok(stop) => stop,
            Err(err) => {
                self.set_state(SupervisorState::Inconsistent);
                self.recovering.store(true, Ordering::SeqCst);
                error!(identity = %identity, error = %err, "stop failed during restart");
                return RestartOutcome::Failed(err.to_string());
            }
        };

        match self.start_locked().await {
            Ok(process) => {
                info!(identity = %identity, pid = ?process.pid, "restart complete");
                RestartOutcome::Restarted { stop, process }
            }
            Err(err) => {
                self.set_state(SupervisorState::Stopped);
                self.recovering.store(true, Ordering::SeqCst);
                error!(
                    identity = %identity,
                    error = %err,
                    "restart failed; process stays down until the next change"
                );
                RestartOutcome::Failed(err.to_string())
            }
        }
    }
}
