// src/exec/local.rs

//! In-process process manager.
//!
//! Keeps at most one registration per identity. A registration survives
//! `stop` (with no pid) and is dropped by `delete`, mirroring how daemonised
//! process managers distinguish the two.
//!
//! A manager built with [`LocalProcessManager::persistent`] also records each
//! registration under a state directory. Identities this instance never
//! started are then answered from those records, so a later session can
//! describe, stop and delete a process an earlier one left behind.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{LocalsvcError, Result};
use crate::types::BoxFuture;

use super::backend::{ProcessDescription, ProcessManager, ProcessRef, StartOptions};
use super::runner::{spawn_child, supervise, PidSlot};
use super::store::{self, RegistrationRecord, RegistrationStore, TERMINATE_GRACE};

struct Registration {
    pid: PidSlot,
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Registration {
    /// A runner is still attached (child alive or waiting to auto-restart).
    fn is_live(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn current_pid(&self) -> Option<u32> {
        *self.pid.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Default)]
pub struct LocalProcessManager {
    registry: Mutex<HashMap<String, Registration>>,
    sessions: AtomicUsize,
    store: Option<RegistrationStore>,
}

impl fmt::Debug for LocalProcessManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalProcessManager")
            .field("registered", &self.registry().len())
            .field("sessions", &self.open_sessions())
            .field("state_dir", &self.store.as_ref().map(RegistrationStore::dir))
            .finish()
    }
}

fn store_error(command: &'static str, err: anyhow::Error) -> LocalsvcError {
    LocalsvcError::command_failed(command, format!("{err:#}"))
}

impl LocalProcessManager {
    /// Manager whose registrations live only as long as it does.
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager that records registrations under `state_dir`.
    pub fn persistent(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: Some(RegistrationStore::new(state_dir)),
            ..Self::default()
        }
    }

    pub fn store(&self) -> Option<&RegistrationStore> {
        self.store.as_ref()
    }

    /// Number of connect calls not yet matched by a disconnect.
    pub fn open_sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, Registration>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn recorded(
        &self,
        identity: &str,
        command: &'static str,
    ) -> Result<Option<RegistrationRecord>> {
        match &self.store {
            Some(store) => store.load(identity).map_err(|e| store_error(command, e)),
            None => Ok(None),
        }
    }

    /// Recorded pid of `identity` if that process is still alive.
    async fn recorded_live_pid(
        &self,
        identity: &str,
        command: &'static str,
    ) -> Result<Option<u32>> {
        match self.recorded(identity, command)?.and_then(|r| r.pid) {
            Some(pid) if store::is_alive(pid).await => Ok(Some(pid)),
            _ => Ok(None),
        }
    }

    /// Kill whatever runs under `identity` and wait for it to finish.
    async fn halt(&self, identity: &str, command: &'static str) -> Result<()> {
        let attached = {
            let mut registry = self.registry();
            registry
                .get_mut(identity)
                .map(|r| (r.cancel.take(), r.handle.take()))
        };

        let Some((cancel, handle)) = attached else {
            return self.halt_recorded(identity, command).await;
        };

        if let Some(cancel) = cancel {
            if cancel.send(()).is_err() {
                debug!(identity, "runner already finished before stop");
            }
        }
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(identity, error = %err, "runner task ended abnormally");
            }
        }
        Ok(())
    }

    /// Terminate a process registered by an earlier session.
    async fn halt_recorded(&self, identity: &str, command: &'static str) -> Result<()> {
        if self.recorded(identity, command)?.is_none() {
            return Err(LocalsvcError::command_failed(
                command,
                format!("process '{identity}' not found"),
            ));
        }

        if let Some(pid) = self.recorded_live_pid(identity, command).await? {
            info!(identity, pid, "terminating process left by an earlier session");
            store::terminate(pid, TERMINATE_GRACE)
                .await
                .map_err(|e| store_error(command, e))?;
        }
        Ok(())
    }
}

impl ProcessManager for LocalProcessManager {
    fn connect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let open = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(open, "process manager session opened");
            Ok(())
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let _ = self
                .sessions
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            debug!(open = self.open_sessions(), "process manager session closed");
            Ok(())
        })
    }

    fn start(&self, options: StartOptions) -> BoxFuture<'_, Result<ProcessRef>> {
        Box::pin(async move {
            let identity = options.identity.clone();

            if let Some(pid) = self.recorded_live_pid(&identity, "start").await? {
                if !self.registry().contains_key(&identity) {
                    return Err(LocalsvcError::command_failed(
                        "start",
                        format!("process '{identity}' is already running as pid {pid}"),
                    ));
                }
            }

            let mut registry = self.registry();
            if registry.get(&identity).is_some_and(Registration::is_live) {
                return Err(LocalsvcError::command_failed(
                    "start",
                    format!("process '{identity}' is already running"),
                ));
            }

            let child = spawn_child(&options, self.store.is_some())
                .map_err(|e| LocalsvcError::command_failed("start", format!("{e:#}")))?;
            let pid = child.id();

            if let Some(store) = &self.store {
                let record = RegistrationRecord {
                    identity: identity.clone(),
                    pid,
                    command: options.command.display(),
                    cwd: options.cwd.clone(),
                };
                if let Err(err) = store.save(&record) {
                    warn!(
                        identity = %identity,
                        error = %format!("{err:#}"),
                        "failed to record registration"
                    );
                }
            }

            let pid_slot: PidSlot = Arc::new(Mutex::new(pid));
            let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
            let handle = tokio::spawn(supervise(
                options,
                child,
                Arc::clone(&pid_slot),
                self.store.clone(),
                cancel_rx,
            ));

            registry.insert(
                identity.clone(),
                Registration {
                    pid: pid_slot,
                    cancel: Some(cancel_tx),
                    handle: Some(handle),
                },
            );

            info!(identity = %identity, pid, "managed process spawned");
            Ok(ProcessRef { identity, pid })
        })
    }

    fn stop<'a>(&'a self, identity: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.halt(identity, "stop").await?;
            if let Some(store) = &self.store {
                store
                    .set_pid(identity, None)
                    .map_err(|e| store_error("stop", e))?;
            }
            info!(identity, "managed process stopped (registration kept)");
            Ok(())
        })
    }

    fn delete<'a>(&'a self, identity: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.halt(identity, "delete").await?;
            self.registry().remove(identity);
            if let Some(store) = &self.store {
                store.remove(identity).map_err(|e| store_error("delete", e))?;
            }
            info!(identity, "managed process deleted");
            Ok(())
        })
    }

    fn describe<'a>(
        &'a self,
        identity: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ProcessDescription>>> {
        Box::pin(async move {
            let attached = self.registry().get(identity).map(Registration::current_pid);
            if let Some(pid) = attached {
                return Ok(vec![ProcessDescription {
                    identity: identity.to_string(),
                    pid,
                }]);
            }

            if self.recorded(identity, "describe")?.is_none() {
                return Ok(Vec::new());
            }
            let pid = self.recorded_live_pid(identity, "describe").await?;
            Ok(vec![ProcessDescription {
                identity: identity.to_string(),
                pid,
            }])
        })
    }
}
