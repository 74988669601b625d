// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job lifecycle state machine: submit, start, stop, remove, and the
//! post-reap decision, plus the restart/flap policy (§4.4).

mod spawn;

pub(crate) use spawn::{apply_rlimit, read_rlimit};
pub use spawn::{spawn_child, SpawnOutcome};

use std::os::unix::io::{FromRawFd, RawFd};
use std::time::Duration;

use svpr_core::{policy, Job, JobState};
use thiserror::Error;
use tracing::{info, warn};

use crate::engine::{Engine, ExitOutcome};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("label already exists")]
    AlreadyExists,
    #[error("invalid job configuration")]
    Invalid,
    #[error("no such job")]
    NoSuchJob,
    #[error("spawn failed: {0}")]
    SpawnFailed(#[from] std::io::Error),
}

/// §4.4 "submit → Idle-watching if on_demand, else immediate start".
pub fn submit(engine: &mut Engine, job: Job) -> Result<(), LifecycleError> {
    if !job.config.validate() {
        return Err(LifecycleError::Invalid);
    }
    if engine.registry.contains(job.label()) {
        return Err(LifecycleError::AlreadyExists);
    }
    let label = job.label().to_string();
    let on_demand = job.config.on_demand;
    let firstborn = job.runtime.firstborn;
    let batch_helper = job.config.batch_helper;
    engine.registry.insert(job);
    if firstborn {
        engine.firstborn_label = Some(label.clone());
    }
    if batch_helper {
        engine.batch_helper_label = Some(label.clone());
    }
    if on_demand {
        arm_idle_watches(engine, &label);
    } else {
        start(engine, &label)?;
    }
    Ok(())
}

/// §4.5: register a read-readiness watch on every valid socket of an
/// idle-watching job. A no-op for jobs with no sockets configured.
fn arm_idle_watches(engine: &Engine, label: &str) {
    let Some(job) = engine.registry.get(label) else { return };
    for socket in &job.config.sockets {
        if let Some(fd) = socket.fd {
            crate::watch::watch_socket(label.to_string(), socket.slot, fd, engine.events.clone());
        }
    }
}

/// §4.5 readiness callback: start the job, which itself is the act of
/// un-arming its watches (a running job never gets new ones).
pub fn on_listener_ready(engine: &mut Engine, label: &str) {
    if let Err(e) = start(engine, label) {
        warn!(label, error = %e, "on-demand start failed");
    }
}

/// §4.5 stale-listener callback: the configuration holds the descriptor, so
/// revoking it here means the entry is never re-armed by a later idle
/// transition. EOF with no pending data still means "start" (§4.4), the
/// same outcome as a readiness callback, just by a different route.
pub fn on_listener_eof(engine: &mut Engine, label: &str, slot: usize) {
    let Some(job) = engine.registry.get_mut(label) else { return };
    if let Some(socket) = job.config.sockets.iter_mut().find(|s| s.slot == slot) {
        socket.revoke();
        info!(label, slot, "on-demand listener revoked after EOF");
    }
    if let Err(e) = start(engine, label) {
        warn!(label, error = %e, "on-demand start after EOF failed");
    }
}

/// Force a start. A no-op if the job is already Running (§4.4 "Concurrent
/// start guard"). Returns `NoSuchJob` if the label is unknown.
pub fn start(engine: &mut Engine, label: &str) -> Result<(), LifecycleError> {
    let Some(job) = engine.registry.get_mut(label) else {
        return Err(LifecycleError::NoSuchJob);
    };
    if job.runtime.is_running() {
        return Ok(());
    }
    let sleep_before_exec = respawn_sleep(job);
    match spawn_child(job, sleep_before_exec) {
        Ok(outcome) => {
            job.runtime.state = JobState::Running;
            job.runtime.pid = Some(outcome.pid);
            job.runtime.last_start = Some(engine.clock.now());
            job.runtime.checked_in = false;
            // Listeners are inherited by the child for inet-compat and
            // rearmed only once the child exits and the job goes idle
            // again; unregistering here is the caller's (demand module's)
            // job once it observes the state transition.
            info!(label, pid = outcome.pid, "job started");
            if let Some(fd) = outcome.checkin_fd {
                spawn_checkin_connection(engine, label, fd);
            }
            spawn_reaper(engine, label, outcome.child);
            Ok(())
        }
        Err(e) => {
            warn!(label, error = %e, "spawn failed");
            Err(LifecycleError::SpawnFailed(e))
        }
    }
}

/// One exit-watch task per running job (§4.1 "one process-exit watch per
/// running job"): awaits the child, then feeds the reap back onto the
/// single event channel so the post-reap decision runs on the event-loop
/// task instead of racing it from here.
fn spawn_reaper(engine: &Engine, label: &str, mut child: tokio::process::Child) {
    let events = engine.events.clone();
    let label = label.to_string();
    tokio::spawn(async move {
        let outcome = match child.wait().await {
            Ok(status) => exit_outcome(status),
            Err(e) => {
                warn!(label, error = %e, "failed to wait on child");
                return;
            }
        };
        let _ = events.send(crate::engine::EngineEvent::ChildExited { label, outcome }).await;
    });
}

/// Hand the supervisor-side end of the check-in socketpair to the same
/// connection-handling loop accepted connections go through, bound to
/// `label` so a `CheckIn` on it resolves without the child naming itself
/// (§3 "Connection", §4.6 `CheckIn`; `original_source/launchd/src/launchd.c`
/// `ipc_open(_fd(spair[0]), j)`).
#[allow(unsafe_code)]
fn spawn_checkin_connection(engine: &Engine, label: &str, fd: RawFd) {
    // SAFETY: `fd` is the parent end of a socketpair created in `spawn_child`
    // and deliberately leaked there (ownership transfers here, to be
    // reclaimed as a `UnixStream`).
    let stream = unsafe { std::os::unix::net::UnixStream::from_raw_fd(fd) };
    let conn = engine.alloc_conn_id();
    let events = engine.events.clone();
    let label = label.to_string();
    tokio::spawn(async move {
        crate::listener::handle_connection(conn, stream, events, Some(label)).await;
    });
}

fn exit_outcome(status: std::process::ExitStatus) -> ExitOutcome {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => ExitOutcome::Exited(code),
        None => ExitOutcome::Signaled(status.signal().unwrap_or(0)),
    }
}

/// §4.4 "penalty sleep": non-on-demand job whose previous run was shorter
/// than the minimum run time and that has a prior failed exit.
fn respawn_sleep(job: &Job) -> Option<Duration> {
    if job.config.on_demand {
        return None;
    }
    if job.runtime.failed_exits == 0 {
        return None;
    }
    let last = job.runtime.last_run_duration?;
    if last >= policy::MIN_JOB_RUN_TIME {
        return None;
    }
    Some(policy::MIN_JOB_RUN_TIME - last)
}

/// Signal TERM to a running child; returns immediately, the reap happens
/// asynchronously (§4.4, §5 "Cancellation and timeouts").
pub fn stop(engine: &mut Engine, label: &str) -> Result<(), LifecycleError> {
    let Some(job) = engine.registry.get(label) else {
        return Err(LifecycleError::NoSuchJob);
    };
    if let Some(pid) = job.runtime.pid {
        let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), nix::sys::signal::Signal::SIGTERM);
    }
    Ok(())
}

/// Stop-and-destroy: stop if running, mark Terminal; the record is freed
/// once reaped. If the job isn't running, it is freed immediately.
pub fn remove(engine: &mut Engine, label: &str) -> Result<(), LifecycleError> {
    let Some(job) = engine.registry.get_mut(label) else {
        return Err(LifecycleError::NoSuchJob);
    };
    if job.runtime.is_running() {
        job.runtime.state = JobState::Terminal;
        let pid = job.runtime.pid.expect("is_running implies pid");
        let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), nix::sys::signal::Signal::SIGTERM);
        Ok(())
    } else {
        engine.registry.remove(label);
        Ok(())
    }
}

/// Post-reap decision (§4.4). Called once the exit-watch for `label` fires.
pub fn on_child_exited(engine: &mut Engine, label: &str, outcome: ExitOutcome) {
    let Some(job) = engine.registry.get_mut(label) else { return };
    let marked_for_removal = job.runtime.state == JobState::Terminal;
    job.runtime.state = JobState::Reaping;
    let elapsed = job.runtime.last_start.map(|start| engine.clock.now().duration_since(start)).unwrap_or_default();
    job.runtime.last_run_duration = Some(elapsed);
    job.runtime.pid = None;

    // §4.4 restart/flap policy: reward resets the counter; otherwise a
    // failed exit increments it.
    if elapsed >= policy::REWARD_INTERVAL {
        job.runtime.failed_exits = 0;
    } else if outcome.is_failed(nix::libc::SIGTERM) {
        job.runtime.failed_exits += 1;
    }

    let is_firstborn = job.runtime.firstborn;
    let needs_checkin = job.config.service_ipc && !job.runtime.checked_in;
    let failed_exits = job.runtime.failed_exits;
    let flapping = failed_exits >= policy::MAX_FAILED_EXITS;
    let on_demand = job.config.on_demand;

    if is_firstborn {
        info!(label, "firstborn exited, initiating shutdown");
        engine.begin_shutdown();
        engine.registry.remove(label);
        return;
    }
    if marked_for_removal {
        info!(label, "removed job reaped");
        engine.registry.remove(label);
        return;
    }
    if needs_checkin {
        warn!(label, "job with service_ipc exited without checking in, removing");
        engine.registry.remove(label);
        return;
    }
    if flapping {
        warn!(label, failed_exits, "job flapping, removing");
        engine.registry.remove(label);
        return;
    }
    if on_demand {
        let job = engine.registry.get_mut(label).expect("checked above");
        job.runtime.state = JobState::IdleWatching;
        arm_idle_watches(engine, label);
        return;
    }
    if engine.shutting_down {
        engine.registry.remove(label);
        return;
    }
    if let Err(e) = start(engine, label) {
        warn!(label, error = %e, "respawn failed");
    }
}

/// §4.6 batch toggle side effect: STOP the designated helper job while
/// batch is disabled, CONT it once the last disabler releases. A no-op if
/// no job was ever submitted with `batch_helper` set, or if it isn't
/// currently running.
pub fn signal_batch_helper(engine: &Engine, stop: bool) {
    let Some(label) = engine.batch_helper_label.as_deref() else { return };
    let Some(job) = engine.registry.get(label) else { return };
    let Some(pid) = job.runtime.pid else { return };
    let signal = if stop { nix::sys::signal::Signal::SIGSTOP } else { nix::sys::signal::Signal::SIGCONT };
    if nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), signal).is_ok() {
        info!(label, stop, "signaled batch helper");
    }
}

/// Check-in contract (§4.4, §4.6 `CheckIn`): only valid on a connection
/// bound to a job. Marks it checked in and fills a default timeout if
/// none was configured.
pub fn check_in(engine: &mut Engine, label: &str) -> Result<svpr_core::JobConfig, LifecycleError> {
    let Some(job) = engine.registry.get_mut(label) else {
        return Err(LifecycleError::NoSuchJob);
    };
    job.runtime.checked_in = true;
    if job.config.checkin_timeout.is_none() {
        job.config.checkin_timeout = Some(Duration::from_secs(20));
    }
    Ok(job.config.clone())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
