// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::engine::Engine;
use crate::env::Identity;
use svpr_core::JobConfig;

fn test_engine() -> Engine {
    let (events, _rx) = tokio::sync::mpsc::channel(16);
    Engine::new(Identity::PerUser { uid: 501 }, events)
}

fn job(label: &str, program: &str, on_demand: bool) -> Job {
    Job::new(JobConfig {
        label: label.to_string(),
        program_arguments: vec![program.to_string()],
        on_demand,
        ..Default::default()
    })
}

#[test]
fn duplicate_submit_returns_already_exists() {
    let mut engine = test_engine();
    submit(&mut engine, job("dup", "/bin/true", true)).unwrap();
    let err = submit(&mut engine, job("dup", "/bin/true", true)).unwrap_err();
    assert!(matches!(err, LifecycleError::AlreadyExists));
}

#[test]
fn submit_without_program_is_invalid() {
    let mut engine = test_engine();
    let cfg = JobConfig { label: "bad".into(), ..Default::default() };
    let err = submit(&mut engine, Job::new(cfg)).unwrap_err();
    assert!(matches!(err, LifecycleError::Invalid));
}

#[tokio::test]
async fn exit_zero_is_not_a_failed_exit_and_job_respawns() {
    let mut engine = test_engine();
    submit(&mut engine, job("t", "/bin/true", false)).unwrap();
    assert!(engine.registry.get("t").unwrap().runtime.is_running());

    on_child_exited(&mut engine, "t", ExitOutcome::Exited(0));

    let job = engine.registry.get("t").expect("exit 0 must not remove the job");
    assert_eq!(job.runtime.failed_exits, 0);
    assert!(job.runtime.is_running(), "non-on-demand job respawns after exit");
}

#[tokio::test]
async fn ten_failed_exits_remove_the_job() {
    let mut engine = test_engine();
    submit(&mut engine, job("f", "/bin/false", false)).unwrap();

    for _ in 0..10 {
        on_child_exited(&mut engine, "f", ExitOutcome::Exited(1));
    }

    assert!(engine.registry.get("f").is_none(), "job must be gone after the 10th failed exit");
}

#[tokio::test]
async fn service_ipc_job_is_removed_if_it_never_checks_in() {
    let mut engine = test_engine();
    let cfg = JobConfig {
        label: "s".into(),
        program_arguments: vec!["/bin/true".into()],
        service_ipc: true,
        ..Default::default()
    };
    submit(&mut engine, Job::new(cfg)).unwrap();

    on_child_exited(&mut engine, "s", ExitOutcome::Exited(0));

    assert!(engine.registry.get("s").is_none());
}

#[tokio::test]
async fn check_in_marks_checked_in_and_fills_default_timeout() {
    let mut engine = test_engine();
    let cfg = JobConfig {
        label: "s".into(),
        program_arguments: vec!["/bin/true".into()],
        service_ipc: true,
        ..Default::default()
    };
    submit(&mut engine, Job::new(cfg)).unwrap();

    let returned = check_in(&mut engine, "s").unwrap();
    assert!(returned.checkin_timeout.is_some());
    assert!(engine.registry.get("s").unwrap().runtime.checked_in);

    // Now a normal exit does not remove it, since it checked in.
    on_child_exited(&mut engine, "s", ExitOutcome::Exited(0));
    assert!(engine.registry.get("s").is_some());
}

#[tokio::test]
async fn on_demand_job_goes_idle_after_exit_instead_of_respawning() {
    let mut engine = test_engine();
    submit(&mut engine, job("d", "/bin/true", true)).unwrap();
    assert_eq!(engine.registry.get("d").unwrap().runtime.state, JobState::IdleWatching);

    start(&mut engine, "d").unwrap();
    on_child_exited(&mut engine, "d", ExitOutcome::Exited(0));

    assert_eq!(engine.registry.get("d").unwrap().runtime.state, JobState::IdleWatching);
}

#[tokio::test]
async fn signal_batch_helper_stops_and_continues_the_running_helper() {
    let mut engine = test_engine();
    let cfg = JobConfig {
        label: "helper".into(),
        program_arguments: vec!["/bin/sleep".into(), "5".into()],
        batch_helper: true,
        ..Default::default()
    };
    submit(&mut engine, Job::new(cfg)).unwrap();
    let pid = engine.registry.get("helper").unwrap().runtime.pid.expect("job is running");

    signal_batch_helper(&engine, true);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(process_state(pid), Some('T'), "SIGSTOP should leave the process traced/stopped");

    signal_batch_helper(&engine, false);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_ne!(process_state(pid), Some('T'), "SIGCONT should resume the process");

    let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), nix::sys::signal::Signal::SIGKILL);
}

/// Reads the single-char process state out of `/proc/<pid>/stat`'s third
/// field, e.g. `'T'` for stopped. `None` if the process is already gone.
fn process_state(pid: u32) -> Option<char> {
    let contents = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    let after_comm = contents.rsplit_once(')')?.1;
    after_comm.trim_start().chars().next()
}

#[tokio::test]
async fn firstborn_exit_triggers_shutdown() {
    let mut engine = test_engine();
    let mut cfg = JobConfig { label: "boot".into(), program_arguments: vec!["/bin/true".into()], ..Default::default() };
    cfg.label = "boot".into();
    let mut j = Job::new(cfg);
    j.runtime.firstborn = true;
    submit(&mut engine, j).unwrap();

    on_child_exited(&mut engine, "boot", ExitOutcome::Exited(0));

    assert!(engine.shutting_down);
    assert!(engine.registry.get("boot").is_none());
}
