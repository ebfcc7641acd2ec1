// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `localsvc`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "localsvc",
    version,
    about = "Keep a local service running with fresh code and fresh bindings.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Localsvc.toml")]
    pub config: String,

    /// Deployment stage used to derive the process identity.
    ///
    /// Falls back to `[service].stage`, then to `$USER`.
    #[arg(long, value_name = "NAME")]
    pub stage: Option<String>,

    /// Teardown pass: stop the registered process and exit.
    #[arg(long)]
    pub remove: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `LOCALSVC_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the resolved service, but don't start anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
