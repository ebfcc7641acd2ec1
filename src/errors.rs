// src/errors.rs

//! Crate-wide error taxonomy and `Result` alias.

use thiserror::Error;

/// Reasons a process definition cannot be launched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigErrorKind {
    #[error("no process identity configured")]
    MissingIdentity,

    #[error("no launch command configured")]
    MissingCommand,

    #[error("{0}")]
    Invalid(String),
}

/// Failures talking to the process manager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisionErrorKind {
    #[error("process manager unreachable: {0}")]
    ConnectFailed(String),

    #[error("liveness query failed: {0}")]
    QueryFailed(String),

    #[error("process manager rejected `{command}`: {reason}")]
    CommandFailed {
        command: &'static str,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum LocalsvcError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigErrorKind),

    #[error("Supervision error: {0}")]
    SupervisionError(#[from] SupervisionErrorKind),

    #[error("Cleanup of '{identity}' failed: {reason}")]
    CleanupError { identity: String, reason: String },

    #[error("Binding fetch failed: {0}")]
    BindingFetchError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LocalsvcError {
    /// Shorthand for a command the process manager refused or failed.
    pub fn command_failed(command: &'static str, reason: impl Into<String>) -> Self {
        SupervisionErrorKind::CommandFailed {
            command,
            reason: reason.into(),
        }
        .into()
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        ConfigErrorKind::Invalid(msg.into()).into()
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, LocalsvcError>;
