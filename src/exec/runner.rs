// src/exec/runner.rs

//! Single managed child process: spawn, relay output, crash auto-restart.

use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use super::backend::StartOptions;
use super::store::RegistrationStore;

/// Upper bound for the exponential crash backoff.
pub const MAX_RESTART_DELAY: Duration = Duration::from_secs(15);

/// Lower bound so a zero delay can't turn into a respawn busy loop.
pub const MIN_RESTART_DELAY: Duration = Duration::from_millis(100);

/// A child that stayed up this long resets the backoff to its initial value.
pub const STABLE_UPTIME: Duration = Duration::from_secs(30);

/// Pid of the current child, shared between the registry and the runner.
pub type PidSlot = Arc<Mutex<Option<u32>>>;

/// Spawn the configured command and start relaying its output.
///
/// The environment in `options.env` is layered on top of the inherited one.
/// A `persistent` child is not killed when its handle is dropped, so it can
/// outlive this process and be torn down by a later session.
pub fn spawn_child(options: &StartOptions, persistent: bool) -> Result<Child> {
    let (program, args) = options.command.program_and_args();

    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .current_dir(&options.cwd)
        .envs(&options.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(!persistent);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning `{}` for '{}'", program, options.identity))?;

    relay_output(&options.identity, &mut child);
    Ok(child)
}

/// Forward stdout lines at info and stderr lines at warn.
///
/// Both pipes are always drained so the child never blocks on a full buffer.
fn relay_output(identity: &str, child: &mut Child) {
    let pid = child.id();

    if let Some(stdout) = child.stdout.take() {
        let identity = identity.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(identity = %identity, pid, "{}", line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        let identity = identity.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(identity = %identity, pid, "{}", line);
            }
        });
    }
}

fn set_pid(
    slot: &PidSlot,
    store: Option<&RegistrationStore>,
    identity: &str,
    pid: Option<u32>,
) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = pid;
    if let Some(store) = store {
        if let Err(err) = store.set_pid(identity, pid) {
            warn!(identity, error = %format!("{err:#}"), "failed to persist pid");
        }
    }
}

/// Own `child` until it is stopped.
///
/// - If the cancel channel fires (or its sender is dropped), the child is
///   killed and the runner returns.
/// - If the child exits on its own and `autorestart` is set, it is respawned
///   after an exponential backoff. Otherwise the runner returns and the
///   registration reports no pid.
///
/// Pid changes are mirrored into `store` when one is given.
pub async fn supervise(
    options: StartOptions,
    child: Child,
    pid_slot: PidSlot,
    store: Option<RegistrationStore>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let store = store.as_ref();
    let identity = options.identity.clone();
    let initial_delay = options.policy.restart_delay.max(MIN_RESTART_DELAY);
    let mut delay = initial_delay;
    let mut current = Some(child);

    loop {
        if let Some(mut child) = current.take() {
            let started = Instant::now();

            tokio::select! {
                status = child.wait() => {
                    set_pid(&pid_slot, store, &identity, None);
                    match status {
                        Ok(status) => info!(
                            identity = %identity,
                            exit_code = status.code().unwrap_or(-1),
                            success = status.success(),
                            "managed process exited"
                        ),
                        Err(err) => warn!(
                            identity = %identity,
                            error = %err,
                            "failed waiting for managed process"
                        ),
                    }

                    if !options.policy.autorestart {
                        debug!(identity = %identity, "autorestart disabled; runner finished");
                        return;
                    }
                    if started.elapsed() >= STABLE_UPTIME {
                        delay = initial_delay;
                    }
                }

                _ = &mut cancel_rx => {
                    info!(identity = %identity, "stop requested; killing managed process");
                    if let Err(err) = child.kill().await {
                        warn!(
                            identity = %identity,
                            error = %err,
                            "failed to kill managed process"
                        );
                    }
                    set_pid(&pid_slot, store, &identity, None);
                    return;
                }
            }
        }

        info!(
            identity = %identity,
            delay_ms = delay.as_millis() as u64,
            "auto-restarting managed process after backoff"
        );

        tokio::select! {
            _ = sleep(delay) => {}
            _ = &mut cancel_rx => {
                debug!(identity = %identity, "stopped while waiting to auto-restart");
                return;
            }
        }
        delay = (delay * 2).min(MAX_RESTART_DELAY);

        match spawn_child(&options, store.is_some()) {
            Ok(child) => {
                set_pid(&pid_slot, store, &identity, child.id());
                current = Some(child);
            }
            Err(err) => {
                error!(identity = %identity, error = %format!("{err:#}"), "respawn failed");
            }
        }
    }
}
