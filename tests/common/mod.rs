#![allow(dead_code)]

use std::error::Error;
use std::time::Duration;

pub use localsvc_test_utils::{init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn Error>>;

/// Let spawned tasks run without moving the (paused) clock.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Advance the paused clock by `ms` and let woken tasks run.
pub async fn advance_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    settle().await;
}
