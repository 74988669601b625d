// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The control-channel command table (§4.6): turns a [`Request`] plus the
//! calling connection's binding into a [`Response`] against the engine.

use std::collections::HashMap;

use svpr_core::ReplyError;
use svpr_wire::{Request, Response, RUsageSnapshot, SubmitResult};

use crate::engine::{ConnectionId, Engine};
use crate::lifecycle::{self, LifecycleError};

pub fn dispatch(engine: &mut Engine, conn: ConnectionId, bound_label: Option<&str>, request: Request) -> Response {
    match request {
        Request::SubmitJob { job } => submit_job(engine, job),
        Request::StartJob { label } => code_reply(lifecycle::start(engine, &label)),
        Request::StopJob { label } => code_reply(lifecycle::stop(engine, &label)),
        Request::RemoveJob { label } => code_reply(lifecycle::remove(engine, &label)),
        Request::CheckIn => check_in(engine, bound_label),
        Request::GetJob { label } => get_job(engine, &label, false),
        Request::GetJobWithHandles { label } => get_job(engine, &label, true),
        Request::GetJobs => get_jobs(engine),
        Request::GetUserEnvironment => Response::Environment { vars: std::env::vars().collect() },
        Request::SetUserEnvironment { vars } => {
            for (k, v) in vars {
                std::env::set_var(k, v);
            }
            Response::ok()
        }
        Request::UnsetUserEnvironment { key } => {
            std::env::remove_var(key);
            Response::ok()
        }
        Request::SetLogMask { mask } => {
            let previous = engine.log_mask;
            engine.log_mask = mask;
            Response::Mask { previous }
        }
        Request::GetLogMask => Response::Mask { previous: engine.log_mask },
        Request::SetUmask { mask } => {
            let previous = engine.umask;
            engine.umask = mask;
            nix::sys::stat::umask(nix::sys::stat::Mode::from_bits_truncate(mask));
            Response::UmaskValue { previous }
        }
        Request::GetUmask => Response::UmaskValue { previous: engine.umask },
        Request::GetRUsageSelf => Response::RUsage { usage: rusage_snapshot(nix::libc::RUSAGE_SELF) },
        Request::GetRUsageChildren => Response::RUsage { usage: rusage_snapshot(nix::libc::RUSAGE_CHILDREN) },
        Request::SetStdOut { target } => set_std_target(engine, target, true),
        Request::SetStdErr { target } => set_std_target(engine, target, false),
        Request::SetResourceLimits { limits } => set_resource_limits(engine, limits),
        Request::GetResourceLimits => Response::ResourceLimits { limits: current_resource_limits() },
        Request::BatchControl { enabled } => {
            let was_enabled = engine.batch_enabled();
            if enabled {
                engine.batch_disablers.remove(&conn);
            } else {
                engine.batch_disablers.insert(conn);
            }
            let now_enabled = engine.batch_enabled();
            if was_enabled && !now_enabled {
                lifecycle::signal_batch_helper(engine, true);
            } else if !was_enabled && now_enabled {
                lifecycle::signal_batch_helper(engine, false);
            }
            Response::ok()
        }
        Request::BatchQuery => Response::Bool { value: engine.batch_enabled() },
        Request::ReloadTTYs => Response::ok(),
        Request::Shutdown => {
            engine.begin_shutdown();
            Response::ok()
        }
    }
}

fn code_reply(result: Result<(), LifecycleError>) -> Response {
    match result {
        Ok(()) => Response::ok(),
        Err(LifecycleError::NoSuchJob) => Response::err(ReplyError::NoSuchJob),
        Err(LifecycleError::AlreadyExists) => Response::err(ReplyError::AlreadyExists),
        Err(LifecycleError::Invalid) => Response::err(ReplyError::Invalid),
        Err(LifecycleError::SpawnFailed(_)) => Response::err(ReplyError::Invalid),
    }
}

fn submit_job(engine: &mut Engine, job: svpr_wire::JobSubmission) -> Response {
    use svpr_wire::JobSubmission;
    match job {
        JobSubmission::Single(cfg) => {
            let outcome = lifecycle::submit(engine, svpr_core::Job::new(cfg));
            Response::Submitted { result: SubmitResult::Single(outcome.err().map(to_reply_error)) }
        }
        JobSubmission::Many(cfgs) => {
            let codes = cfgs
                .into_iter()
                .map(|cfg| lifecycle::submit(engine, svpr_core::Job::new(cfg)).err().map(to_reply_error))
                .collect();
            Response::Submitted { result: SubmitResult::Many(codes) }
        }
    }
}

fn to_reply_error(e: LifecycleError) -> ReplyError {
    match e {
        LifecycleError::AlreadyExists => ReplyError::AlreadyExists,
        LifecycleError::Invalid => ReplyError::Invalid,
        LifecycleError::NoSuchJob => ReplyError::NoSuchJob,
        LifecycleError::SpawnFailed(_) => ReplyError::Invalid,
    }
}

fn check_in(engine: &mut Engine, bound_label: Option<&str>) -> Response {
    let Some(label) = bound_label else {
        return Response::err(ReplyError::NotPermitted);
    };
    match lifecycle::check_in(engine, label) {
        Ok(config) => Response::Job { config },
        Err(_) => Response::err(ReplyError::NoSuchJob),
    }
}

fn get_job(engine: &Engine, label: &str, with_handles: bool) -> Response {
    match engine.registry.get(label) {
        Some(job) => {
            let config = if with_handles { job.config.clone() } else { job.config.without_handles() };
            Response::Job { config }
        }
        None => Response::err(ReplyError::NoSuchJob),
    }
}

fn get_jobs(engine: &Engine) -> Response {
    let jobs: HashMap<String, svpr_core::JobConfig> =
        engine.registry.iter().map(|(label, job)| (label.to_string(), job.config.without_handles())).collect();
    Response::Jobs { jobs }
}

#[allow(unsafe_code)]
fn rusage_snapshot(who: i32) -> RUsageSnapshot {
    // SAFETY: `rusage` is a plain POD struct; zeroed is a valid bit pattern,
    // and `getrusage` fills every field before we read it back.
    let mut usage: nix::libc::rusage = unsafe { std::mem::zeroed() };
    let ok = unsafe { nix::libc::getrusage(who, &mut usage) == 0 };
    if !ok {
        return RUsageSnapshot::default();
    }
    RUsageSnapshot {
        user_time_us: usage.ru_utime.tv_sec * 1_000_000 + i64::from(usage.ru_utime.tv_usec as i32),
        system_time_us: usage.ru_stime.tv_sec * 1_000_000 + i64::from(usage.ru_stime.tv_usec as i32),
        max_rss_kb: usage.ru_maxrss,
        minor_faults: usage.ru_minflt,
        major_faults: usage.ru_majflt,
        voluntary_ctx_switches: usage.ru_nvcsw,
        involuntary_ctx_switches: usage.ru_nivcsw,
    }
}

fn set_std_target(engine: &mut Engine, target: svpr_wire::StdTarget, is_stdout: bool) -> Response {
    use svpr_wire::StdTarget;
    match target {
        StdTarget::Path(path) => {
            let path = std::path::PathBuf::from(path);
            if is_stdout {
                engine.pending_stdout = Some(path);
            } else {
                engine.pending_stderr = Some(path);
            }
            Response::ok()
        }
        StdTarget::Fd(slot) => {
            let target_fd = if is_stdout { 1 } else { 2 };
            match nix::unistd::dup2(slot.index() as i32, target_fd) {
                Ok(_) => Response::ok(),
                Err(_) => Response::err(ReplyError::Invalid),
            }
        }
    }
}

/// §4.6 "Apply to the supervisor": each bound is set on the supervisor's own
/// process via `setrlimit`, then the reply reports what's actually in
/// effect afterward rather than echoing the request back unexamined.
fn set_resource_limits(engine: &Engine, limits: svpr_core::ResourceLimits) -> Response {
    for (kind, bound) in &limits {
        lifecycle::apply_rlimit(*kind, *bound);
        if svpr_core::is_propagated_to_kernel(*kind) && engine.identity.is_first_process() {
            tracing::debug!(?kind, ?bound, "propagating limit to kernel tunable");
        }
    }
    Response::ResourceLimits { limits: current_resource_limits() }
}

/// §4.6 `GetResourceLimits` "Current limits": a full readback of the
/// supervisor's own limits for every recognized kind, not merely the ones
/// a caller has previously set.
fn current_resource_limits() -> svpr_core::ResourceLimits {
    svpr_core::LimitKind::ALL.iter().map(|kind| (*kind, lifecycle::read_rlimit(*kind))).collect()
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
