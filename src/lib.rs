// src/lib.rs

pub mod bindings;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::bindings::{
    BindingResolver, CommandBindingResolver, FileBindingResolver, StaticBindingResolver,
};
use crate::cli::CliArgs;
use crate::config::loader::{config_root_dir, load_and_validate};
use crate::config::model::{BindingSourceConfig, ConfigFile};
use crate::credentials::EnvCredentialProvider;
use crate::engine::{Collaborators, DeploymentContext, RunOutcome, Supervisor};
use crate::exec::LocalProcessManager;
use crate::fs::RealFileSystem;
use crate::types::DeploymentMode;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and identity derivation
/// - process manager, binding resolver and credential provider
/// - the supervisor (debounced restarts + binding poll)
/// - the file watcher (deploy mode only)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    let root_dir = config_root_dir(&config_path);

    let stage = cfg.stage(args.stage.as_deref());
    let spec = cfg.process_spec(&root_dir, stage.as_deref());

    if args.dry_run {
        print_dry_run(&cfg, &root_dir, &spec, stage.as_deref());
        return Ok(());
    }

    let mode = if args.remove {
        DeploymentMode::Remove
    } else {
        DeploymentMode::Deploy
    };

    let collaborators = Collaborators {
        manager: Arc::new(LocalProcessManager::persistent(cfg.state_dir(&root_dir))),
        resolver: binding_resolver(&cfg, &root_dir, &spec.cwd),
        credentials: Arc::new(EnvCredentialProvider::new(
            cfg.credentials.inject,
            cfg.credentials.region.clone(),
        )),
        context: DeploymentContext::new(mode),
    };

    let mut supervisor = Supervisor::new(spec, collaborators, cfg.supervisor_options());
    info!(identity = %supervisor.identity(), ?mode, "supervisor ready");

    if cfg.watch.enabled {
        supervisor.watch_directory(cfg.watch_filter()?)?;
    } else {
        debug!("file watching disabled by config");
    }

    if !args.remove {
        for (key, fallback) in &cfg.bindings.keys {
            if let Err(err) = supervisor.add_environment(key.clone(), fallback.clone()).await {
                warn!(key = %key, error = %err, "initial binding reconciliation failed");
            }
        }
    }

    let outcome = supervisor.run().await?;
    match outcome {
        RunOutcome::TornDown(stopped) => {
            info!(?stopped, "teardown complete");
            supervisor.shutdown();
            return Ok(());
        }
        RunOutcome::Started(process) => {
            info!(identity = %process.identity, pid = ?process.pid, "watching for changes; Ctrl-C to stop");
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    if let Err(err) = supervisor.stop().await {
        warn!(error = %err, "failed to stop process on shutdown");
    }
    supervisor.shutdown();
    Ok(())
}

/// Resolver for `[bindings.source]`. Relative file paths are resolved
/// against the config directory; commands run in the service directory.
fn binding_resolver(cfg: &ConfigFile, root_dir: &Path, cwd: &Path) -> Arc<dyn BindingResolver> {
    match &cfg.bindings.source {
        BindingSourceConfig::None => Arc::new(StaticBindingResolver::empty()),
        BindingSourceConfig::File { path } => Arc::new(FileBindingResolver::new(
            root_dir.join(path),
            Arc::new(RealFileSystem),
        )),
        BindingSourceConfig::Command { cmd } => {
            Arc::new(CommandBindingResolver::new(cmd.clone(), cwd.to_path_buf()))
        }
    }
}

/// Simple dry-run output: identity, launch command, bindings.
fn print_dry_run(
    cfg: &ConfigFile,
    root_dir: &Path,
    spec: &engine::ManagedProcessSpec,
    stage: Option<&str>,
) {
    println!("localsvc dry-run");
    println!("  identity: {}", spec.identity);
    println!("  stage: {}", stage.unwrap_or("<none>"));
    println!("  cwd: {}", spec.cwd.display());
    println!("  command: {}", spec.command.display());
    println!(
        "  autorestart: {} (delay {:?})",
        spec.policy.autorestart, spec.policy.restart_delay
    );
    println!(
        "  debounce: {}ms, binding poll: {}ms",
        cfg.supervisor.debounce_ms, cfg.supervisor.poll_interval_ms
    );
    println!("  state dir: {}", cfg.state_dir(root_dir).display());
    println!();

    if !spec.env.is_empty() {
        println!("env ({}):", spec.env.len());
        for key in spec.env.keys() {
            println!("  - {key}");
        }
    }

    println!("bindings ({}):", cfg.bindings.keys.len());
    for key in cfg.bindings.keys.keys() {
        println!("  - {key}");
    }
    match &cfg.bindings.source {
        BindingSourceConfig::None => println!("  source: none"),
        BindingSourceConfig::File { path } => println!("  source: file {}", path.display()),
        BindingSourceConfig::Command { cmd } => println!("  source: command `{cmd}`"),
    }

    if cfg.watch.enabled {
        println!("watch: {} (exclude {:?})", spec.cwd.display(), cfg.watch.exclude);
    } else {
        println!("watch: disabled");
    }

    debug!("dry-run complete (no execution)");
}
