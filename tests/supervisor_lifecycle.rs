// tests/supervisor_lifecycle.rs

mod common;
use crate::common::{init_tracing, TestResult};

use localsvc::credentials::Credentials;
use localsvc::engine::{
    RestartOutcome, RunOutcome, SkipReason, StopOutcome, SupervisorState,
};
use localsvc::errors::{ConfigErrorKind, LocalsvcError, SupervisionErrorKind};
use localsvc::exec::ProcessRef;
use localsvc_test_utils::{ManagerCall, Rig, SpecBuilder};

const ID: &str = "dev-api";

#[tokio::test(start_paused = true)]
async fn run_starts_the_process_once() -> TestResult {
    init_tracing();
    let rig = Rig::new();
    let sup = rig.supervisor(SpecBuilder::new(ID).build());

    assert_eq!(sup.state(), SupervisorState::Unstarted);
    let outcome = sup.run().await?;

    assert_eq!(
        outcome,
        RunOutcome::Started(ProcessRef {
            identity: ID.to_string(),
            pid: Some(101),
        })
    );
    assert_eq!(sup.state(), SupervisorState::Running);
    assert_eq!(rig.manager.start_count(), 1);
    assert_eq!(rig.manager.delete_count(), 0);
    assert!(sup.is_running().await?);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn run_replaces_a_leftover_instance() -> TestResult {
    init_tracing();
    let rig = Rig::new();
    let stale_pid = rig.manager.preload_running(ID);
    let sup = rig.supervisor(SpecBuilder::new(ID).build());

    let RunOutcome::Started(process) = sup.run().await? else {
        panic!("expected a start in deploy mode");
    };

    assert_ne!(process.pid, Some(stale_pid));
    assert_eq!(
        rig.manager.operations(),
        vec![
            ManagerCall::Describe(ID.to_string()),
            ManagerCall::Describe(ID.to_string()),
            ManagerCall::Delete(ID.to_string()),
            ManagerCall::Start(rig.manager.starts()[0].clone()),
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn every_manager_call_is_wrapped_in_a_session() -> TestResult {
    init_tracing();
    let rig = Rig::new();
    let sup = rig.supervisor(SpecBuilder::new(ID).build());

    sup.run().await?;
    sup.is_running().await?;
    sup.stop().await?;

    assert_eq!(rig.manager.open_sessions(), 0);

    // connect / <op> / disconnect, never two operations in one session
    let calls = rig.manager.calls();
    for window in calls.chunks(3) {
        assert_eq!(window[0], ManagerCall::Connect);
        assert_eq!(window[2], ManagerCall::Disconnect);
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn disconnect_failure_does_not_mask_the_result() -> TestResult {
    init_tracing();
    let rig = Rig::new();
    rig.manager.set_fail_disconnect(true);
    let sup = rig.supervisor(SpecBuilder::new(ID).build());

    let outcome = sup.run().await?;
    assert!(matches!(outcome, RunOutcome::Started(_)));
    assert!(sup.is_running().await?);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn connect_failure_propagates_from_run() {
    init_tracing();
    let rig = Rig::new();
    rig.manager.set_fail_connect(true);
    let sup = rig.supervisor(SpecBuilder::new(ID).build());

    let err = sup.run().await.unwrap_err();
    assert!(matches!(
        err,
        LocalsvcError::SupervisionError(SupervisionErrorKind::QueryFailed(_))
    ));
    assert_eq!(rig.manager.start_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn start_error_propagates_from_run() {
    init_tracing();
    let rig = Rig::new();
    rig.manager.set_fail_start(true);
    let sup = rig.supervisor(SpecBuilder::new(ID).build());

    let err = sup.run().await.unwrap_err();
    assert!(matches!(
        err,
        LocalsvcError::SupervisionError(SupervisionErrorKind::CommandFailed { command: "start", .. })
    ));
    assert_eq!(rig.manager.open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn start_rejects_an_incomplete_definition() {
    init_tracing();
    let rig = Rig::new();

    let sup = rig.supervisor(SpecBuilder::new("").build());
    let err = sup.start().await.unwrap_err();
    assert!(matches!(err, LocalsvcError::ConfigError(ConfigErrorKind::MissingIdentity)));

    let sup = rig.supervisor(SpecBuilder::new(ID).script("  ").build());
    let err = sup.start().await.unwrap_err();
    assert!(matches!(err, LocalsvcError::ConfigError(ConfigErrorKind::MissingCommand)));

    assert!(rig.manager.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_without_a_process_is_a_no_op() -> TestResult {
    init_tracing();
    let rig = Rig::new();
    let sup = rig.supervisor(SpecBuilder::new(ID).build());

    assert_eq!(sup.stop().await?, None);
    assert_eq!(rig.manager.delete_count(), 0);
    assert_eq!(rig.manager.stop_count(), 0);
    assert_eq!(sup.state(), SupervisorState::Unstarted);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stop_removes_the_registration() -> TestResult {
    init_tracing();
    let rig = Rig::new();
    let sup = rig.supervisor(SpecBuilder::new(ID).build());
    sup.run().await?;

    assert_eq!(sup.stop().await?, Some(StopOutcome::Removed));
    assert_eq!(sup.state(), SupervisorState::Stopped);
    assert!(!rig.manager.is_registered(ID));
    assert!(!sup.is_running().await?);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stop_falls_back_when_delete_fails() -> TestResult {
    init_tracing();
    let rig = Rig::new();
    let sup = rig.supervisor(SpecBuilder::new(ID).build());
    sup.run().await?;

    rig.manager.set_fail_delete(true);
    rig.manager.clear_calls();
    assert_eq!(sup.stop().await?, Some(StopOutcome::StoppedFallback));
    assert_eq!(rig.manager.stop_count(), 1);
    assert_eq!(
        rig.manager.operations(),
        vec![
            ManagerCall::Describe(ID.to_string()),
            ManagerCall::Delete(ID.to_string()),
            ManagerCall::Stop(ID.to_string()),
        ]
    );
    assert!(rig.manager.is_registered(ID));
    assert_eq!(rig.manager.pid_of(ID), None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stop_reports_inconsistent_when_both_cleanups_fail() -> TestResult {
    init_tracing();
    let rig = Rig::new();
    let sup = rig.supervisor(SpecBuilder::new(ID).build());
    sup.run().await?;

    rig.manager.set_fail_delete(true);
    rig.manager.set_fail_stop(true);

    let outcome = sup.stop().await?;
    assert!(matches!(outcome, Some(StopOutcome::Inconsistent { .. })));
    assert_eq!(sup.state(), SupervisorState::Inconsistent);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn is_running_is_idempotent() -> TestResult {
    init_tracing();
    let rig = Rig::new();
    let sup = rig.supervisor(SpecBuilder::new(ID).build());

    assert_eq!(sup.is_running().await?, sup.is_running().await?);
    sup.run().await?;
    assert_eq!(sup.is_running().await?, sup.is_running().await?);
    assert!(sup.is_running().await?);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn registered_without_pid_is_not_running() -> TestResult {
    init_tracing();
    let rig = Rig::new();
    let sup = rig.supervisor(SpecBuilder::new(ID).build());
    sup.run().await?;

    rig.manager.kill(ID);
    assert!(!sup.is_running().await?);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn teardown_run_stops_and_never_starts() -> TestResult {
    init_tracing();
    let rig = Rig::removing();
    rig.manager.preload_running(ID);
    let sup = rig.supervisor(SpecBuilder::new(ID).build());

    let outcome = sup.run().await?;
    assert_eq!(outcome, RunOutcome::TornDown(Some(StopOutcome::Removed)));
    assert_eq!(rig.manager.start_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn teardown_run_swallows_errors() -> TestResult {
    init_tracing();
    let rig = Rig::removing();
    rig.manager.set_fail_connect(true);
    let sup = rig.supervisor(SpecBuilder::new(ID).build());

    assert_eq!(sup.run().await?, RunOutcome::TornDown(None));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn teardown_restart_calls_neither_stop_nor_start() -> TestResult {
    init_tracing();
    let rig = Rig::removing();
    rig.manager.preload_running(ID);
    let sup = rig.supervisor(SpecBuilder::new(ID).build());

    let outcome = sup.restart().await;
    assert_eq!(outcome, Some(RestartOutcome::Skipped(SkipReason::TearingDown)));
    assert!(rig.manager.calls().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn restart_before_start_is_skipped() -> TestResult {
    init_tracing();
    let rig = Rig::new();
    let sup = rig.supervisor(SpecBuilder::new(ID).build());

    let outcome = sup.restart().await;
    assert_eq!(outcome, Some(RestartOutcome::Skipped(SkipReason::NotRunning)));
    assert_eq!(rig.manager.start_count(), 0);
    assert_eq!(rig.manager.delete_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn restart_stops_then_starts() -> TestResult {
    init_tracing();
    let rig = Rig::new();
    let sup = rig.supervisor(SpecBuilder::new(ID).build());
    sup.run().await?;
    rig.manager.clear_calls();

    let outcome = sup.restart().await;
    assert_eq!(
        outcome,
        Some(RestartOutcome::Restarted {
            stop: Some(StopOutcome::Removed),
            process: ProcessRef {
                identity: ID.to_string(),
                pid: Some(102),
            },
        })
    );

    let ops = rig.manager.operations();
    let delete_at = ops.iter().position(|c| matches!(c, ManagerCall::Delete(_)));
    let start_at = ops.iter().position(|c| matches!(c, ManagerCall::Start(_)));
    assert!(delete_at < start_at, "delete must precede start: {ops:?}");
    assert_eq!(sup.state(), SupervisorState::Running);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn restart_uses_stop_fallback() -> TestResult {
    init_tracing();
    let rig = Rig::new();
    let sup = rig.supervisor(SpecBuilder::new(ID).build());
    sup.run().await?;
    rig.manager.set_fail_delete(true);

    let outcome = sup.restart().await;
    assert!(matches!(
        outcome,
        Some(RestartOutcome::Restarted {
            stop: Some(StopOutcome::StoppedFallback),
            ..
        })
    ));
    assert_eq!(rig.manager.start_count(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn inconsistent_stop_never_starts_a_second_instance() -> TestResult {
    init_tracing();
    let rig = Rig::new();
    let sup = rig.supervisor(SpecBuilder::new(ID).build());
    sup.run().await?;
    rig.manager.set_fail_delete(true);
    rig.manager.set_fail_stop(true);

    assert_eq!(sup.restart().await, Some(RestartOutcome::Inconsistent));
    assert_eq!(rig.manager.start_count(), 1);
    assert_eq!(sup.state(), SupervisorState::Inconsistent);

    // The next trigger retries once the manager cooperates again.
    rig.manager.set_fail_delete(false);
    rig.manager.set_fail_stop(false);
    let outcome = sup.restart().await;
    assert!(matches!(outcome, Some(RestartOutcome::Restarted { .. })));
    assert_eq!(sup.state(), SupervisorState::Running);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_restart_leaves_process_down_until_next_trigger() -> TestResult {
    init_tracing();
    let rig = Rig::new();
    let sup = rig.supervisor(SpecBuilder::new(ID).build());
    sup.run().await?;

    rig.manager.set_fail_start(true);
    let outcome = sup.restart().await;
    assert!(matches!(outcome, Some(RestartOutcome::Failed(_))));
    assert_eq!(sup.state(), SupervisorState::Stopped);
    assert!(!sup.is_running().await?);

    // no automatic retry
    let starts = rig.manager.start_count();
    common::advance_ms(60_000).await;
    assert_eq!(rig.manager.start_count(), starts);

    rig.manager.set_fail_start(false);
    let outcome = sup.restart().await;
    assert!(matches!(
        outcome,
        Some(RestartOutcome::Restarted { stop: None, .. })
    ));
    assert!(sup.is_running().await?);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn explicit_stop_is_not_undone_by_a_restart() -> TestResult {
    init_tracing();
    let rig = Rig::new();
    let sup = rig.supervisor(SpecBuilder::new(ID).build());
    sup.run().await?;

    rig.manager.set_fail_start(true);
    sup.restart().await;
    rig.manager.set_fail_start(false);
    sup.stop().await?;

    assert_eq!(
        sup.restart().await,
        Some(RestartOutcome::Skipped(SkipReason::NotRunning))
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn every_start_fetches_fresh_credentials() -> TestResult {
    init_tracing();
    let rig = Rig::new();
    let sup = rig.supervisor(SpecBuilder::new(ID).env("PORT", "3000").build());
    sup.run().await?;

    rig.credentials.rotate(Credentials {
        access_key_id: Some("AKIAROTATED".to_string()),
        secret_access_key: Some("rotated".to_string()),
        session_token: Some("token-2".to_string()),
        region: Some("eu-west-1".to_string()),
    });
    sup.restart().await;

    assert_eq!(rig.credentials.calls(), 2);
    let starts = rig.manager.starts();
    assert_eq!(starts[0].env.get("AWS_ACCESS_KEY_ID").map(String::as_str), Some("AKIATEST"));
    assert_eq!(starts[0].env.get("AWS_SESSION_TOKEN"), None);
    assert_eq!(starts[1].env.get("AWS_ACCESS_KEY_ID").map(String::as_str), Some("AKIAROTATED"));
    assert_eq!(starts[1].env.get("AWS_SESSION_TOKEN").map(String::as_str), Some("token-2"));
    assert_eq!(starts[1].env.get("PORT").map(String::as_str), Some("3000"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn explicit_env_wins_over_credentials() -> TestResult {
    init_tracing();
    let rig = Rig::new();
    let sup = rig.supervisor(SpecBuilder::new(ID).env("AWS_REGION", "us-east-1").build());
    sup.run().await?;

    let starts = rig.manager.starts();
    assert_eq!(starts[0].env.get("AWS_REGION").map(String::as_str), Some("us-east-1"));
    Ok(())
}
