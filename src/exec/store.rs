// src/exec/store.rs

//! On-disk registrations for [`super::LocalProcessManager`].
//!
//! Each `localsvc` invocation is a separate process, so a registration has
//! to outlive the manager that created it for a later `--remove` pass (or a
//! later session replacing a leftover instance) to find it. One small TOML
//! record per identity lives under the state directory:
//!
//! ```toml
//! identity = "dev-api"
//! pid = 48213
//! command = "node dist/server.js --port 3000"
//! cwd = "/srv/api"
//! ```
//!
//! A record without `pid` is a registration whose process was stopped.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// How long a process from an earlier session gets to exit after SIGTERM.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

const POLL_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub identity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub command: String,
    pub cwd: PathBuf,
}

/// Directory of registration records, one file per identity.
#[derive(Debug, Clone)]
pub struct RegistrationStore {
    dir: PathBuf,
}

impl RegistrationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, identity: &str) -> PathBuf {
        let file: String = identity
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
                _ => '_',
            })
            .collect();
        self.dir.join(format!("{file}.toml"))
    }

    pub fn load(&self, identity: &str) -> Result<Option<RegistrationRecord>> {
        let path = self.path_for(identity);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("reading registration {:?}", path));
            }
        };
        let record: RegistrationRecord = toml::from_str(&text)
            .with_context(|| format!("parsing registration {:?}", path))?;
        Ok(Some(record))
    }

    /// Write `record`, replacing any previous one atomically.
    pub fn save(&self, record: &RegistrationRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating state directory {:?}", self.dir))?;

        let path = self.path_for(&record.identity);
        let tmp = path.with_extension("toml.tmp");
        let text = toml::to_string(record).context("serializing registration")?;
        fs::write(&tmp, text).with_context(|| format!("writing {:?}", tmp))?;
        fs::rename(&tmp, &path).with_context(|| format!("replacing {:?}", path))?;
        Ok(())
    }

    /// Update the pid of an existing record. A missing record stays missing.
    pub fn set_pid(&self, identity: &str, pid: Option<u32>) -> Result<()> {
        match self.load(identity)? {
            Some(mut record) if record.pid != pid => {
                record.pid = pid;
                self.save(&record)
            }
            _ => Ok(()),
        }
    }

    pub fn remove(&self, identity: &str) -> Result<()> {
        let path = self.path_for(identity);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("removing registration {:?}", path)),
        }
    }
}

async fn kill(args: &[&str]) -> Result<bool> {
    let status = Command::new("kill")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .context("running `kill`")?;
    Ok(status.success())
}

/// Whether `pid` names a live process (`kill -0`).
pub async fn is_alive(pid: u32) -> bool {
    kill(&["-0", &pid.to_string()]).await.unwrap_or(false)
}

/// SIGTERM `pid`, then SIGKILL it if it is still alive after `grace`.
pub async fn terminate(pid: u32, grace: Duration) -> Result<()> {
    let target = pid.to_string();
    if !kill(&["-TERM", &target]).await? && is_alive(pid).await {
        bail!("failed to signal process {pid}");
    }

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if !is_alive(pid).await {
            debug!(pid, "process exited after SIGTERM");
            return Ok(());
        }
        sleep(POLL_STEP).await;
    }

    warn!(pid, "process ignored SIGTERM; sending SIGKILL");
    if !kill(&["-KILL", &target]).await? && is_alive(pid).await {
        bail!("failed to kill process {pid}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: Option<u32>) -> RegistrationRecord {
        RegistrationRecord {
            identity: "dev-api".to_string(),
            pid,
            command: "node server.js".to_string(),
            cwd: PathBuf::from("/srv/api"),
        }
    }

    #[test]
    fn missing_record_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistrationStore::new(dir.path().join("state"));
        assert_eq!(store.load("dev-api").unwrap(), None);
        store.remove("dev-api").unwrap();
        store.set_pid("dev-api", Some(7)).unwrap();
        assert_eq!(store.load("dev-api").unwrap(), None);
    }

    #[test]
    fn pid_updates_keep_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistrationStore::new(dir.path());

        store.save(&record(Some(4242))).unwrap();
        assert_eq!(store.load("dev-api").unwrap(), Some(record(Some(4242))));

        store.set_pid("dev-api", None).unwrap();
        assert_eq!(store.load("dev-api").unwrap(), Some(record(None)));

        store.remove("dev-api").unwrap();
        assert_eq!(store.load("dev-api").unwrap(), None);
    }

    #[test]
    fn identities_map_to_safe_file_names() {
        let store = RegistrationStore::new("/tmp/state");
        assert_eq!(
            store.path_for("dev/../api"),
            PathBuf::from("/tmp/state/dev_.._api.toml")
        );
    }
}
