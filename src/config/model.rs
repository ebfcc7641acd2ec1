// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::engine::{ManagedProcessSpec, SupervisorOptions};
use crate::errors::{LocalsvcError, Result};
use crate::exec::{LaunchCommand, RestartPolicy};
use crate::watch::WatchFilter;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [service]
/// name = "api"
/// interpreter = "node"
/// script = "dist/server.js"
///
/// [supervisor]
/// debounce_ms = 3000
/// state_dir = ".localsvc"
///
/// [watch]
/// exclude = ["node_modules/**", "**/*.log"]
///
/// [bindings.keys]
/// REDIS_URL = "redis://localhost:6379"
///
/// [bindings.source]
/// kind = "command"
/// cmd = "sst secrets list env --stage dev"
/// ```
///
/// Only `[service]` is required.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    pub service: ServiceSection,

    #[serde(default)]
    pub supervisor: SupervisorSection,

    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub bindings: BindingsSection,

    #[serde(default)]
    pub credentials: CredentialsSection,
}

/// Validated configuration. Build it through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub service: ServiceSection,
    pub supervisor: SupervisorSection,
    pub watch: WatchSection,
    pub bindings: BindingsSection,
    pub credentials: CredentialsSection,
}

/// `[service]` section: the one process to supervise.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSection {
    /// Base name; combined with the stage into the process identity.
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub stage: Option<String>,

    /// Relative paths are resolved against the config file's directory.
    #[serde(default = "default_cwd")]
    pub cwd: PathBuf,

    #[serde(default)]
    pub interpreter: Option<String>,

    #[serde(default)]
    pub interpreter_args: Vec<String>,

    #[serde(default)]
    pub script: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_true")]
    pub autorestart: bool,

    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_cwd() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

fn default_restart_delay_ms() -> u64 {
    1000
}

/// `[supervisor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSection {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Where process registrations are recorded between sessions. Relative
    /// paths are resolved against the config file's directory.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".localsvc")
}

fn default_debounce_ms() -> u64 {
    3000
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            state_dir: default_state_dir(),
        }
    }
}

/// `[watch]` section. Dot-prefixed paths are always ignored on top of
/// `exclude`.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            enabled: true,
            exclude: Vec::new(),
        }
    }
}

/// `[bindings]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BindingsSection {
    /// Tracked binding keys mapped to the value used until the source
    /// provides one.
    #[serde(default)]
    pub keys: BTreeMap<String, String>,

    #[serde(default)]
    pub source: BindingSourceConfig,
}

/// `[bindings.source]`, tagged by `kind`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BindingSourceConfig {
    #[default]
    None,
    /// Dotenv-style file, re-read on every poll.
    File { path: PathBuf },
    /// Shell command printing dotenv-style lines.
    Command { cmd: String },
}

/// `[credentials]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsSection {
    #[serde(default = "default_true")]
    pub inject: bool,

    #[serde(default)]
    pub region: Option<String>,
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            inject: true,
            region: None,
        }
    }
}

/// Pick the deployment stage: explicit flag, then `[service].stage`, then
/// whatever `user` yields (normally `$USER`). Blank values are skipped.
pub fn resolve_stage(
    flag: Option<&str>,
    configured: Option<&str>,
    user: impl FnOnce() -> Option<String>,
) -> Option<String> {
    let non_blank = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };

    flag.and_then(non_blank)
        .or_else(|| configured.and_then(non_blank))
        .or_else(|| user().as_deref().and_then(non_blank))
}

impl ConfigFile {
    /// Construct without validation. Prefer `ConfigFile::try_from(raw)`.
    pub fn new_unchecked(
        service: ServiceSection,
        supervisor: SupervisorSection,
        watch: WatchSection,
        bindings: BindingsSection,
        credentials: CredentialsSection,
    ) -> Self {
        Self {
            service,
            supervisor,
            watch,
            bindings,
            credentials,
        }
    }

    /// Stage for this session, falling back to the `USER` environment
    /// variable.
    pub fn stage(&self, flag: Option<&str>) -> Option<String> {
        resolve_stage(flag, self.service.stage.as_deref(), || {
            std::env::var("USER").ok()
        })
    }

    /// `"{stage}-{name}"`, or just the name without a stage.
    pub fn identity(&self, stage: Option<&str>) -> String {
        match stage {
            Some(stage) => format!("{stage}-{}", self.service.name),
            None => self.service.name.clone(),
        }
    }

    /// Working directory of the service, resolved against `root`.
    pub fn service_cwd(&self, root: &Path) -> PathBuf {
        root.join(&self.service.cwd)
    }

    /// Registration state directory, resolved against `root`.
    pub fn state_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.supervisor.state_dir)
    }

    pub fn launch_command(&self) -> LaunchCommand {
        LaunchCommand {
            interpreter: self.service.interpreter.clone(),
            interpreter_args: self.service.interpreter_args.clone(),
            script: self.service.script.clone(),
            args: self.service.args.clone(),
        }
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy {
            autorestart: self.service.autorestart,
            restart_delay: Duration::from_millis(self.service.restart_delay_ms),
        }
    }

    /// The process definition for this config. Binding fallbacks are not
    /// included; they are seeded through `Supervisor::add_environment`.
    pub fn process_spec(&self, root: &Path, stage: Option<&str>) -> ManagedProcessSpec {
        let mut spec = ManagedProcessSpec::new(
            self.identity(stage),
            self.service_cwd(root),
            self.launch_command(),
        )
        .with_policy(self.restart_policy());
        spec.env = self.service.env.clone();
        spec
    }

    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            debounce: Duration::from_millis(self.supervisor.debounce_ms),
            poll_interval: Duration::from_millis(self.supervisor.poll_interval_ms),
        }
    }

    pub fn watch_filter(&self) -> Result<WatchFilter> {
        WatchFilter::new(&self.watch.exclude)
            .map_err(|e| LocalsvcError::invalid_config(format!("[watch].exclude: {e:#}")))
    }
}
