// tests/config_loading.rs

mod common;
use crate::common::{init_tracing, TestResult};

use std::path::{Path, PathBuf};
use std::time::Duration;

use localsvc::config::model::resolve_stage;
use localsvc::config::{load_and_validate, load_from_path, BindingSourceConfig};
use localsvc::config::loader::config_root_dir;
use localsvc::errors::{ConfigErrorKind, LocalsvcError};
use localsvc_test_utils::ConfigBuilder;

fn demo(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

#[test]
fn minimal_demo_uses_defaults() -> TestResult {
    init_tracing();
    let cfg = load_and_validate(demo("minimal.toml"))?;

    assert_eq!(cfg.service.name, "api");
    assert_eq!(cfg.supervisor.debounce_ms, 3000);
    assert_eq!(cfg.supervisor.poll_interval_ms, 10_000);
    assert!(cfg.watch.enabled);
    assert!(cfg.watch.exclude.is_empty());
    assert!(cfg.bindings.keys.is_empty());
    assert_eq!(cfg.bindings.source, BindingSourceConfig::None);
    assert!(cfg.credentials.inject);
    assert!(cfg.service.autorestart);

    let options = cfg.supervisor_options();
    assert_eq!(options.debounce, Duration::from_millis(3000));
    assert_eq!(options.poll_interval, Duration::from_millis(10_000));
    assert_eq!(cfg.state_dir(Path::new("/srv")), PathBuf::from("/srv/.localsvc"));
    Ok(())
}

#[test]
fn state_dir_resolves_against_config_root() {
    let cfg = ConfigBuilder::new("api", "x").state_dir("run/localsvc").build();
    assert_eq!(
        cfg.state_dir(Path::new("/srv/api")),
        PathBuf::from("/srv/api/run/localsvc")
    );

    let cfg = ConfigBuilder::new("api", "x").state_dir("/var/run/localsvc").build();
    assert_eq!(cfg.state_dir(Path::new("/srv/api")), PathBuf::from("/var/run/localsvc"));
}

#[test]
fn full_demo_resolves_every_section() -> TestResult {
    init_tracing();
    let path = demo("secrets-command.toml");
    let cfg = load_and_validate(&path)?;

    assert_eq!(cfg.service.interpreter.as_deref(), Some("node"));
    assert_eq!(cfg.service.interpreter_args, vec!["--enable-source-maps".to_string()]);
    assert_eq!(cfg.launch_command().display(), "node --enable-source-maps dist/server.js --port 3000");
    assert_eq!(cfg.bindings.keys.len(), 2);
    assert_eq!(
        cfg.bindings.source,
        BindingSourceConfig::Command {
            cmd: "sst secrets list env --stage dev".to_string()
        }
    );
    assert_eq!(cfg.credentials.region.as_deref(), Some("eu-west-1"));
    assert_eq!(cfg.supervisor.debounce_ms, 1500);
    assert!(!cfg.service.autorestart);

    let root = config_root_dir(&path);
    let spec = cfg.process_spec(&root, Some("dev"));
    assert_eq!(spec.identity, "dev-api");
    assert_eq!(spec.cwd, root.join("services/api"));
    assert_eq!(spec.env.get("NODE_ENV").map(String::as_str), Some("development"));
    // binding fallbacks are seeded later, not baked into the process definition
    assert!(!spec.env.contains_key("REDIS_URL"));

    let filter = cfg.watch_filter()?;
    assert!(filter.is_ignored("node_modules/x/index.js"));
    assert!(filter.is_ignored("logs/today.log"));
    assert!(!filter.is_ignored("src/index.ts"));
    Ok(())
}

#[test]
fn file_source_demo_parses() -> TestResult {
    let cfg = load_and_validate(demo("bindings-file.toml"))?;
    assert_eq!(
        cfg.bindings.source,
        BindingSourceConfig::File {
            path: PathBuf::from(".env.bindings")
        }
    );
    assert!(!cfg.watch.enabled);
    Ok(())
}

#[test]
fn raw_load_does_not_validate() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("Localsvc.toml");
    std::fs::write(&path, "[service]\nname = \"\"\nscript = \"x\"\n")?;

    assert!(load_from_path(&path).is_ok());
    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, LocalsvcError::ConfigError(ConfigErrorKind::MissingIdentity)));
    Ok(())
}

#[test]
fn invalid_toml_is_a_toml_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("Localsvc.toml");
    std::fs::write(&path, "[service\nname = 1")?;

    assert!(matches!(load_and_validate(&path).unwrap_err(), LocalsvcError::TomlError(_)));
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_and_validate("/definitely/not/here/Localsvc.toml").unwrap_err();
    assert!(matches!(err, LocalsvcError::IoError(_)));
}

#[test]
fn unknown_source_kind_is_rejected() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("Localsvc.toml");
    std::fs::write(
        &path,
        "[service]\nname = \"a\"\nscript = \"b\"\n[bindings.source]\nkind = \"vault\"\n",
    )?;
    assert!(matches!(load_and_validate(&path).unwrap_err(), LocalsvcError::TomlError(_)));
    Ok(())
}

#[test]
fn validation_rejects_bad_values() {
    let cases = vec![
        ConfigBuilder::new("api", "").try_build(),
        ConfigBuilder::new("api", "x").debounce_ms(0).try_build(),
        ConfigBuilder::new("api", "x").poll_interval_ms(0).try_build(),
        ConfigBuilder::new("api", "x").state_dir("").try_build(),
        ConfigBuilder::new("api", "x").exclude("src/[").try_build(),
        ConfigBuilder::new("api", "x").interpreter(" ").try_build(),
        ConfigBuilder::new("api", "x").binding("", "v").try_build(),
        ConfigBuilder::new("api", "x")
            .source(BindingSourceConfig::Command { cmd: " ".into() })
            .try_build(),
        ConfigBuilder::new("api", "x")
            .source(BindingSourceConfig::File { path: PathBuf::new() })
            .try_build(),
    ];

    let errors: Vec<LocalsvcError> = cases.into_iter().map(|c| c.unwrap_err()).collect();
    assert!(matches!(errors[0], LocalsvcError::ConfigError(ConfigErrorKind::MissingCommand)));
    for err in &errors[1..] {
        assert!(
            matches!(err, LocalsvcError::ConfigError(ConfigErrorKind::Invalid(_))),
            "unexpected error: {err}"
        );
    }
}

#[test]
fn identity_combines_stage_and_name() {
    let cfg = ConfigBuilder::new("worker", "index.js").build();
    assert_eq!(cfg.identity(Some("alice")), "alice-worker");
    assert_eq!(cfg.identity(None), "worker");
}

#[test]
fn stage_priority_is_flag_then_config_then_user() {
    let user = || Some("alice".to_string());

    assert_eq!(resolve_stage(Some("pr-12"), Some("dev"), user).as_deref(), Some("pr-12"));
    assert_eq!(resolve_stage(None, Some("dev"), user).as_deref(), Some("dev"));
    assert_eq!(resolve_stage(None, None, user).as_deref(), Some("alice"));
    assert_eq!(resolve_stage(Some(" "), None, user).as_deref(), Some("alice"));
    assert_eq!(resolve_stage(None, None, || None), None);
}

#[test]
fn explicit_stage_flag_wins_over_environment() {
    let cfg = ConfigBuilder::new("api", "x").stage("dev").build();
    assert_eq!(cfg.stage(Some("ci")).as_deref(), Some("ci"));
    assert_eq!(cfg.stage(None).as_deref(), Some("dev"));
}

#[test]
fn bare_config_name_resolves_to_current_dir() -> TestResult {
    assert_eq!(config_root_dir(Path::new("Localsvc.toml")), std::env::current_dir()?);
    assert_eq!(config_root_dir(Path::new("cfg/Localsvc.toml")), PathBuf::from("cfg"));
    Ok(())
}
