pub mod builders;
pub mod fake_bindings;
pub mod fake_manager;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

pub use builders::{debounce_only, ConfigBuilder, Rig, SpecBuilder};
pub use fake_bindings::{FakeCredentials, FakeResolver};
pub use fake_manager::{FakeProcessManager, ManagerCall};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
///
/// Not for paused-clock tests waiting on long timers: the timeout is itself
/// a timer and auto-advance will fire it.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}
