// src/logging.rs

//! Logging setup for `localsvc` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `LOCALSVC_LOG` environment variable, in `EnvFilter` directive syntax
//!    (e.g. "debug" or "localsvc=debug,notify=warn")
//! 3. default to `info`
//!
//! Logs are sent to STDERR; the managed process's output is relayed through
//! the same subscriber.

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

const ENV_VAR: &str = "LOCALSVC_LOG";
const DEFAULT_DIRECTIVES: &str = "info";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(ENV_VAR).ok();
    let directives = filter_directives(cli_level, env.as_deref());

    fmt()
        .with_env_filter(EnvFilter::try_new(&directives)?)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}

/// Directive string for the subscriber. Blank or unparsable env values fall
/// back to the default.
fn filter_directives(cli_level: Option<LogLevel>, env: Option<&str>) -> String {
    if let Some(lvl) = cli_level {
        return level_directive(lvl).to_string();
    }

    env.map(str::trim)
        .filter(|s| !s.is_empty() && EnvFilter::try_new(s).is_ok())
        .unwrap_or(DEFAULT_DIRECTIVES)
        .to_string()
}

fn level_directive(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_level_wins_over_environment() {
        assert_eq!(filter_directives(Some(LogLevel::Warn), Some("trace")), "warn");
    }

    #[test]
    fn environment_directives_pass_through() {
        assert_eq!(
            filter_directives(None, Some(" localsvc=debug,notify=warn ")),
            "localsvc=debug,notify=warn"
        );
    }

    #[test]
    fn blank_or_invalid_environment_falls_back_to_info() {
        assert_eq!(filter_directives(None, None), "info");
        assert_eq!(filter_directives(None, Some("  ")), "info");
        assert_eq!(filter_directives(None, Some("localsvc=loudest")), "info");
    }
}
