use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use localsvc::errors::{LocalsvcError, Result, SupervisionErrorKind};
use localsvc::exec::{ProcessDescription, ProcessManager, ProcessRef, StartOptions};
use localsvc::types::BoxFuture;

/// One recorded interaction with the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerCall {
    Connect,
    Disconnect,
    Describe(String),
    Start(StartOptions),
    Stop(String),
    Delete(String),
}

impl ManagerCall {
    fn is_session(&self) -> bool {
        matches!(self, ManagerCall::Connect | ManagerCall::Disconnect)
    }
}

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<ManagerCall>,
    /// identity -> pid (`None` = registered but stopped).
    processes: HashMap<String, Option<u32>>,
    next_pid: u32,
    open_sessions: i64,
    fail_connect: bool,
    fail_disconnect: bool,
    fail_describe: bool,
    fail_start: bool,
    fail_stop: bool,
    fail_delete: bool,
    start_delay: Option<Duration>,
}

/// A fake process manager that:
/// - records every call in order
/// - keeps a registry of identity -> pid, handing out pids from 101
/// - can be told to fail any individual operation.
#[derive(Debug, Clone)]
pub struct FakeProcessManager {
    inner: Arc<Mutex<Inner>>,
}

impl Default for FakeProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProcessManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_pid: 101,
                ..Inner::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Pretend a previous session left `identity` running.
    pub fn preload_running(&self, identity: &str) -> u32 {
        let mut inner = self.lock();
        let pid = inner.next_pid;
        inner.next_pid += 1;
        inner.processes.insert(identity.to_string(), Some(pid));
        pid
    }

    /// Simulate the process dying on its own (registration kept).
    pub fn kill(&self, identity: &str) {
        if let Some(pid) = self.lock().processes.get_mut(identity) {
            *pid = None;
        }
    }

    pub fn pid_of(&self, identity: &str) -> Option<u32> {
        self.lock().processes.get(identity).copied().flatten()
    }

    pub fn is_registered(&self, identity: &str) -> bool {
        self.lock().processes.contains_key(identity)
    }

    /// Every call, including connect/disconnect.
    pub fn calls(&self) -> Vec<ManagerCall> {
        self.lock().calls.clone()
    }

    /// Calls other than connect/disconnect.
    pub fn operations(&self) -> Vec<ManagerCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| !c.is_session())
            .cloned()
            .collect()
    }

    pub fn starts(&self) -> Vec<StartOptions> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                ManagerCall::Start(options) => Some(options.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn start_count(&self) -> usize {
        self.starts().len()
    }

    pub fn delete_count(&self) -> usize {
        self.count(|c| matches!(c, ManagerCall::Delete(_)))
    }

    pub fn stop_count(&self) -> usize {
        self.count(|c| matches!(c, ManagerCall::Stop(_)))
    }

    pub fn count(&self, pred: impl Fn(&ManagerCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Connects minus disconnects. Zero once every session was released.
    pub fn open_sessions(&self) -> i64 {
        self.lock().open_sessions
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.lock().fail_connect = fail;
    }

    pub fn set_fail_disconnect(&self, fail: bool) {
        self.lock().fail_disconnect = fail;
    }

    pub fn set_fail_describe(&self, fail: bool) {
        self.lock().fail_describe = fail;
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.lock().fail_start = fail;
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.lock().fail_stop = fail;
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.lock().fail_delete = fail;
    }

    /// Make every `start` take `delay` (virtual time under a paused clock).
    pub fn set_start_delay(&self, delay: Option<Duration>) {
        self.lock().start_delay = delay;
    }
}

impl ProcessManager for FakeProcessManager {
    fn connect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner.calls.push(ManagerCall::Connect);
            if inner.fail_connect {
                return Err(LocalsvcError::from(SupervisionErrorKind::ConnectFailed(
                    "fake: daemon down".into(),
                )));
            }
            inner.open_sessions += 1;
            Ok(())
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner.calls.push(ManagerCall::Disconnect);
            inner.open_sessions -= 1;
            if inner.fail_disconnect {
                return Err(LocalsvcError::command_failed("disconnect", "fake: socket closed"));
            }
            Ok(())
        })
    }

    fn start(&self, options: StartOptions) -> BoxFuture<'_, Result<ProcessRef>> {
        Box::pin(async move {
            let delay = {
                let mut inner = self.lock();
                inner.calls.push(ManagerCall::Start(options.clone()));
                inner.start_delay
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let mut inner = self.lock();
            if inner.fail_start {
                return Err(LocalsvcError::command_failed("start", "fake: spawn refused"));
            }
            if let Some(Some(pid)) = inner.processes.get(&options.identity) {
                return Err(LocalsvcError::command_failed(
                    "start",
                    format!("fake: '{}' already running as {pid}", options.identity),
                ));
            }

            let pid = inner.next_pid;
            inner.next_pid += 1;
            inner.processes.insert(options.identity.clone(), Some(pid));
            Ok(ProcessRef {
                identity: options.identity,
                pid: Some(pid),
            })
        })
    }

    fn stop<'a>(&'a self, identity: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner.calls.push(ManagerCall::Stop(identity.to_string()));
            if inner.fail_stop {
                return Err(LocalsvcError::command_failed("stop", "fake: stop refused"));
            }
            match inner.processes.get_mut(identity) {
                Some(pid) => {
                    *pid = None;
                    Ok(())
                }
                None => Err(LocalsvcError::command_failed(
                    "stop",
                    format!("fake: '{identity}' not found"),
                )),
            }
        })
    }

    fn delete<'a>(&'a self, identity: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner.calls.push(ManagerCall::Delete(identity.to_string()));
            if inner.fail_delete {
                return Err(LocalsvcError::command_failed("delete", "fake: delete refused"));
            }
            match inner.processes.remove(identity) {
                Some(_) => Ok(()),
                None => Err(LocalsvcError::command_failed(
                    "delete",
                    format!("fake: '{identity}' not found"),
                )),
            }
        })
    }

    fn describe<'a>(
        &'a self,
        identity: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ProcessDescription>>> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner.calls.push(ManagerCall::Describe(identity.to_string()));
            if inner.fail_describe {
                return Err(LocalsvcError::from(SupervisionErrorKind::QueryFailed(
                    "fake: describe refused".into(),
                )));
            }
            let described: Vec<ProcessDescription> = inner
                .processes
                .get(identity)
                .map(|pid| ProcessDescription {
                    identity: identity.to_string(),
                    pid: *pid,
                })
                .into_iter()
                .collect();
            Ok(described)
        })
    }
}
