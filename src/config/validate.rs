// src/config/validate.rs

use crate::config::model::{BindingSourceConfig, ConfigFile, RawConfigFile};
use crate::errors::{ConfigErrorKind, LocalsvcError, Result};
use crate::watch::WatchFilter;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = LocalsvcError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.service,
            raw.supervisor,
            raw.watch,
            raw.bindings,
            raw.credentials,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_service(cfg)?;
    validate_supervisor(cfg)?;
    validate_watch(cfg)?;
    validate_bindings(cfg)?;
    Ok(())
}

fn validate_service(cfg: &RawConfigFile) -> Result<()> {
    if cfg.service.name.trim().is_empty() {
        return Err(ConfigErrorKind::MissingIdentity.into());
    }
    if cfg.service.script.trim().is_empty() {
        return Err(ConfigErrorKind::MissingCommand.into());
    }
    if let Some(interpreter) = &cfg.service.interpreter {
        if interpreter.trim().is_empty() {
            return Err(LocalsvcError::invalid_config(
                "[service].interpreter must not be empty when set",
            ));
        }
    }
    Ok(())
}

fn validate_supervisor(cfg: &RawConfigFile) -> Result<()> {
    if cfg.supervisor.debounce_ms == 0 {
        return Err(LocalsvcError::invalid_config(
            "[supervisor].debounce_ms must be >= 1 (got 0)",
        ));
    }
    if cfg.supervisor.poll_interval_ms == 0 {
        return Err(LocalsvcError::invalid_config(
            "[supervisor].poll_interval_ms must be >= 1 (got 0)",
        ));
    }
    if cfg.supervisor.state_dir.as_os_str().is_empty() {
        return Err(LocalsvcError::invalid_config(
            "[supervisor].state_dir must not be empty",
        ));
    }
    Ok(())
}

fn validate_watch(cfg: &RawConfigFile) -> Result<()> {
    WatchFilter::new(&cfg.watch.exclude)
        .map_err(|e| LocalsvcError::invalid_config(format!("[watch].exclude: {e:#}")))?;
    Ok(())
}

fn validate_bindings(cfg: &RawConfigFile) -> Result<()> {
    if let Some(key) = cfg.bindings.keys.keys().find(|k| k.trim().is_empty()) {
        return Err(LocalsvcError::invalid_config(format!(
            "[bindings.keys] contains an empty key ({key:?})"
        )));
    }

    match &cfg.bindings.source {
        BindingSourceConfig::None => {}
        BindingSourceConfig::File { path } => {
            if path.as_os_str().is_empty() {
                return Err(LocalsvcError::invalid_config(
                    "[bindings.source] kind = \"file\" needs a non-empty `path`",
                ));
            }
        }
        BindingSourceConfig::Command { cmd } => {
            if cmd.trim().is_empty() {
                return Err(LocalsvcError::invalid_config(
                    "[bindings.source] kind = \"command\" needs a non-empty `cmd`",
                ));
            }
        }
    }
    Ok(())
}
