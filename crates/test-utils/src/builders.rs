#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use localsvc::config::{
    BindingSourceConfig, BindingsSection, ConfigFile, CredentialsSection, RawConfigFile,
    ServiceSection, SupervisorSection, WatchSection,
};
use localsvc::credentials::Credentials;
use localsvc::engine::{
    Collaborators, DeploymentContext, ManagedProcessSpec, Supervisor, SupervisorOptions,
};
use localsvc::errors::Result;
use localsvc::exec::{LaunchCommand, RestartPolicy};
use localsvc::types::DeploymentMode;

use crate::fake_bindings::{FakeCredentials, FakeResolver};
use crate::fake_manager::FakeProcessManager;

/// Builder for `ManagedProcessSpec`. Defaults to `node server.js` in `.`.
pub struct SpecBuilder {
    spec: ManagedProcessSpec,
}

impl SpecBuilder {
    pub fn new(identity: &str) -> Self {
        Self {
            spec: ManagedProcessSpec::new(
                identity,
                ".",
                LaunchCommand {
                    interpreter: Some("node".to_string()),
                    interpreter_args: vec![],
                    script: "server.js".to_string(),
                    args: vec![],
                },
            ),
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.spec.cwd = cwd.into();
        self
    }

    pub fn script(mut self, script: &str) -> Self {
        self.spec.command.script = script.to_string();
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.spec = self.spec.with_env(key, value);
        self
    }

    pub fn policy(mut self, policy: RestartPolicy) -> Self {
        self.spec = self.spec.with_policy(policy);
        self
    }

    pub fn build(self) -> ManagedProcessSpec {
        self.spec
    }
}

/// Fakes wired into a `Supervisor`, kept around so tests can drive and
/// inspect them.
#[derive(Debug, Clone)]
pub struct Rig {
    pub manager: FakeProcessManager,
    pub resolver: FakeResolver,
    pub credentials: FakeCredentials,
    pub context: DeploymentContext,
}

impl Default for Rig {
    fn default() -> Self {
        Self::new()
    }
}

impl Rig {
    pub fn new() -> Self {
        Self {
            manager: FakeProcessManager::new(),
            resolver: FakeResolver::new(),
            credentials: FakeCredentials::new(Credentials {
                access_key_id: Some("AKIATEST".to_string()),
                secret_access_key: Some("secret".to_string()),
                session_token: None,
                region: Some("eu-west-1".to_string()),
            }),
            context: DeploymentContext::new(DeploymentMode::Deploy),
        }
    }

    pub fn removing() -> Self {
        let rig = Self::new();
        rig.context.set_mode(DeploymentMode::Remove);
        rig
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            manager: Arc::new(self.manager.clone()),
            resolver: Arc::new(self.resolver.clone()),
            credentials: Arc::new(self.credentials.clone()),
            context: self.context.clone(),
        }
    }

    /// Supervisor with a 3 s debounce and a 10 s binding poll.
    pub fn supervisor(&self, spec: ManagedProcessSpec) -> Supervisor {
        self.supervisor_with(spec, SupervisorOptions::default())
    }

    pub fn supervisor_with(
        &self,
        spec: ManagedProcessSpec,
        options: SupervisorOptions,
    ) -> Supervisor {
        Supervisor::new(spec, self.collaborators(), options)
    }
}

/// Options with the given debounce and the binding poll effectively off
/// (one hour) so only explicit triggers matter.
pub fn debounce_only(debounce: Duration) -> SupervisorOptions {
    SupervisorOptions {
        debounce,
        poll_interval: Duration::from_secs(3600),
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigBuilder {
    config: RawConfigFile,
}

impl ConfigBuilder {
    pub fn new(name: &str, script: &str) -> Self {
        Self {
            config: RawConfigFile {
                service: ServiceSection {
                    name: name.to_string(),
                    stage: None,
                    cwd: PathBuf::from("."),
                    interpreter: None,
                    interpreter_args: vec![],
                    script: script.to_string(),
                    args: vec![],
                    autorestart: true,
                    restart_delay_ms: 1000,
                    env: BTreeMap::new(),
                },
                supervisor: SupervisorSection::default(),
                watch: WatchSection::default(),
                bindings: BindingsSection::default(),
                credentials: CredentialsSection::default(),
            },
        }
    }

    pub fn stage(mut self, stage: &str) -> Self {
        self.config.service.stage = Some(stage.to_string());
        self
    }

    pub fn interpreter(mut self, interpreter: &str) -> Self {
        self.config.service.interpreter = Some(interpreter.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.config
            .service
            .env
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn binding(mut self, key: &str, fallback: &str) -> Self {
        self.config
            .bindings
            .keys
            .insert(key.to_string(), fallback.to_string());
        self
    }

    pub fn source(mut self, source: BindingSourceConfig) -> Self {
        self.config.bindings.source = source;
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.config.watch.exclude.push(pattern.to_string());
        self
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.config.supervisor.debounce_ms = ms;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.supervisor.poll_interval_ms = ms;
        self
    }

    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.supervisor.state_dir = dir.into();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}
