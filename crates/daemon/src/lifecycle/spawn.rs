// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The twelve-step child spawn sequence (§4.4).
//!
//! Everything from step 1 through step 11 runs in the child, between fork
//! and exec, via [`std::os::unix::process::CommandExt::pre_exec`]. This is
//! the one place in the workspace where `unsafe` is unavoidable: the
//! pre-exec closure runs in a forked child with a single thread and must
//! only call async-signal-safe functions (§4.4, `original_source`'s
//! `job_start_child` does the same dance in C).

use std::os::unix::io::RawFd;
use std::os::unix::process::CommandExt;
use std::time::Duration;

use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};
use svpr_core::{Job, StdRedirect};
use tokio::process::{Child, Command};

use crate::env::TRUSTED_FD_ENV;

pub struct SpawnOutcome {
    pub pid: u32,
    /// Supervisor-side endpoint of the check-in socketpair, kept open only
    /// when `service_ipc` or `inet_compat` is set (§4.4 step 1).
    pub checkin_fd: Option<RawFd>,
    /// The handle the caller awaits to learn when this run ends (§4.1 "one
    /// process-exit watch per running job").
    pub child: Child,
}

#[allow(unsafe_code)]
pub fn spawn_child(job: &Job, sleep_before_exec: Option<Duration>) -> std::io::Result<SpawnOutcome> {
    let cfg = job.config.clone();
    let program = cfg.program.clone().unwrap_or_else(|| cfg.program_arguments[0].clone().into());

    let mut checkin_fd = None;
    let mut child_checkin_fd: Option<RawFd> = None;
    if cfg.service_ipc || cfg.inet_compat {
        use std::os::unix::io::AsRawFd;
        // No CLOEXEC on either end: the child end must survive exec. Both
        // `OwnedFd`s are deliberately leaked — ownership passes to the raw
        // descriptor bookkeeping here (the child end lives on in the
        // forked process; the parent end is handed back as `checkin_fd`
        // for the listener to wrap in a bound connection).
        let (parent, child) = socketpair(AddressFamily::Unix, SockType::Stream, None, SockFlag::empty())?;
        checkin_fd = Some(parent.as_raw_fd());
        child_checkin_fd = Some(child.as_raw_fd());
        std::mem::forget(parent);
        std::mem::forget(child);
        // The supervisor's own end must not leak into grandchildren.
        set_cloexec(checkin_fd.expect("just set"))?;
    }

    let mut command = Command::new(&program);
    command.args(cfg.program_arguments.iter().skip(1));
    command.env_clear();
    command.envs(cfg.environment.iter());
    if let Some(fd) = child_checkin_fd {
        command.env(TRUSTED_FD_ENV, fd.to_string());
    }
    if let Some(dir) = &cfg.working_directory {
        command.current_dir(dir);
    }

    // §4.4 step 8→9: stdout/stderr are wired up inside `pre_exec`, after
    // chroot/setuid drop privileges, not here against the supervisor's own
    // identity. `inet_compat`'s descriptor duplication happens there too,
    // as a pair of `dup2`s onto the same source fd rather than two
    // separately-owning `Stdio` handles over one descriptor.
    let stdout_redirect = cfg.stdout.clone();
    let stderr_redirect = cfg.stderr.clone();
    let inet_compat = cfg.inet_compat;
    let inet_sock = cfg.sockets.first().and_then(|s| s.fd);

    let nice = cfg.nice;
    let low_priority_io = cfg.low_priority_io;
    let root_directory = cfg.root_directory.clone();
    let uid = cfg.uid;
    let gid = cfg.gid;
    let init_groups = cfg.init_groups;
    let session_create = cfg.session_create;
    let limits = cfg.resource_limits.clone();
    let debug = cfg.debug;
    let umask = cfg.umask;

    // SAFETY: `pre_exec` runs in the freshly forked child before exec, with
    // a single thread and no other code racing it. Every call below is
    // restricted to functions documented as safe to use in that window
    // (no allocation beyond what these crates already do internally,
    // matching the constraint `std::os::unix::process::CommandExt::pre_exec`
    // imposes on its caller).
    unsafe {
        command.pre_exec(move || {
            // step 2 (firstborn process-group/foreground setup happens in
            // the parent via `setpgid` + `tcsetpgrp`, not here).

            // step 3: scheduling priority.
            if let Some(n) = nice {
                nix::libc::nice(n);
            }

            // step 4: resource limits.
            for (kind, bound) in &limits {
                apply_rlimit(*kind, *bound);
            }

            // step 5: security session. No platform hook in this build;
            // `session_create` becomes a documented no-op.
            let _ = session_create;

            // step 6: supplementary groups.
            if init_groups {
                if let Some(uid) = uid {
                    if let Ok(pw) = nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(uid)) {
                        if let Some(pw) = pw {
                            let _ = nix::unistd::initgroups(
                                &std::ffi::CString::new(pw.name.as_bytes()).unwrap_or_default(),
                                nix::unistd::Gid::from_raw(gid.unwrap_or(pw.gid.as_raw())),
                            );
                        }
                    }
                }
            }

            // step 7: low-priority I/O. Linux's nearest equivalent is an
            // ioprio syscall with no libc wrapper; approximate with the
            // nice-value-derived ioprio convention via a best-effort
            // syscall, ignoring failures (non-essential QoS hint).
            if low_priority_io {
                #[cfg(target_os = "linux")]
                unsafe {
                    const IOPRIO_WHO_PROCESS: i32 = 1;
                    const IOPRIO_CLASS_IDLE: i32 = 3;
                    const IOPRIO_CLASS_SHIFT: i32 = 13;
                    nix::libc::syscall(
                        nix::libc::SYS_ioprio_set,
                        IOPRIO_WHO_PROCESS,
                        0,
                        IOPRIO_CLASS_IDLE << IOPRIO_CLASS_SHIFT,
                    );
                }
            }

            // step 8: chroot, setgid/setuid, chdir, umask.
            if let Some(root) = &root_directory {
                nix::unistd::chroot(root.as_path())?;
                nix::unistd::chdir("/")?;
            }
            if let Some(gid) = gid {
                nix::unistd::setgid(nix::unistd::Gid::from_raw(gid))?;
            }
            if let Some(uid) = uid {
                nix::unistd::setuid(nix::unistd::Uid::from_raw(uid))?;
            }
            if let Some(mask) = umask {
                nix::sys::stat::umask(nix::sys::stat::Mode::from_bits_truncate(mask));
            }

            // step 9: stdout/stderr, opened now so a `root_directory`/
            // `uid`/`gid` job's log path resolves and is owned under the
            // child's identity, not the supervisor's.
            if let Some(redirect) = &stdout_redirect {
                redirect_std(nix::libc::STDOUT_FILENO, redirect)?;
            }
            if let Some(redirect) = &stderr_redirect {
                redirect_std(nix::libc::STDERR_FILENO, redirect)?;
            }
            // inetd-compat duplicates the job's listening descriptor onto
            // stdin/stdout instead of merely inheriting it.
            if inet_compat {
                if let Some(sock) = inet_sock {
                    nix::unistd::dup2(sock, nix::libc::STDIN_FILENO)?;
                    if stdout_redirect.is_none() {
                        nix::unistd::dup2(sock, nix::libc::STDOUT_FILENO)?;
                    }
                }
            }

            // step 11: new session leader.
            let _ = nix::unistd::setsid();

            // debug supplement (`original_source`'s `debug_before_kick`):
            // stop so a debugger or test harness can attach before exec.
            if debug {
                let _ = nix::sys::signal::raise(nix::sys::signal::Signal::SIGSTOP);
            }

            Ok(())
        });
    }

    if let Some(d) = sleep_before_exec {
        std::thread::sleep(d);
    }

    let child = command.spawn()?;
    let pid = child.id().expect("just spawned, not yet reaped");

    Ok(SpawnOutcome { pid, checkin_fd, child })
}

fn set_cloexec(fd: RawFd) -> std::io::Result<()> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};
    fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(std::io::Error::from)?;
    Ok(())
}

/// Point `target_fd` (`STDOUT_FILENO`/`STDERR_FILENO`) at `redirect`, called
/// from inside `pre_exec` with the child's privileges already in effect.
/// Async-signal-safe: `open`/`dup2`/`close` only.
fn redirect_std(target_fd: RawFd, redirect: &StdRedirect) -> std::io::Result<()> {
    use nix::fcntl::{open, OFlag};
    use nix::sys::stat::Mode;
    match redirect {
        StdRedirect::Path(path) => {
            let fd = open(path.as_path(), OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND, Mode::from_bits_truncate(0o644))?;
            if fd != target_fd {
                nix::unistd::dup2(fd, target_fd)?;
                let _ = nix::unistd::close(fd);
            }
            Ok(())
        }
        StdRedirect::Fd(fd) => {
            if *fd != target_fd {
                nix::unistd::dup2(*fd, target_fd)?;
            }
            Ok(())
        }
    }
}

fn rlimit_resource(kind: svpr_core::LimitKind) -> nix::libc::c_int {
    use svpr_core::LimitKind::*;
    (match kind {
        Cpu => nix::libc::RLIMIT_CPU,
        FileSize => nix::libc::RLIMIT_FSIZE,
        Data => nix::libc::RLIMIT_DATA,
        StackSize => nix::libc::RLIMIT_STACK,
        Core => nix::libc::RLIMIT_CORE,
        ResidentSetSize => nix::libc::RLIMIT_RSS,
        MemoryLock => nix::libc::RLIMIT_MEMLOCK,
        NumFiles => nix::libc::RLIMIT_NOFILE,
        NumProcesses => nix::libc::RLIMIT_NPROC,
        VirtualMemory => nix::libc::RLIMIT_AS,
    }) as nix::libc::c_int
}

/// Apply a bound to the calling process's own limits. Used both inside the
/// pre-exec closure (step 4, against the about-to-exec child) and directly
/// against the supervisor's own process for `SetResourceLimits` (§4.6
/// "Apply to the supervisor").
#[allow(unsafe_code)]
pub(crate) fn apply_rlimit(kind: svpr_core::LimitKind, bound: svpr_core::LimitBound) {
    let resource = rlimit_resource(kind);
    let mut current = nix::libc::rlimit { rlim_cur: 0, rlim_max: 0 };
    unsafe {
        if nix::libc::getrlimit(resource as nix::libc::__rlimit_resource_t, &mut current) != 0 {
            return;
        }
        if let Some(soft) = bound.soft {
            current.rlim_cur = soft;
        }
        if let Some(hard) = bound.hard {
            current.rlim_max = hard;
        }
        let _ = nix::libc::setrlimit(resource as nix::libc::__rlimit_resource_t, &current);
    }
}

/// Read back the calling process's own current bound for `kind` (§4.6
/// `GetResourceLimits` "Current limits"). Defaults to an empty bound if the
/// kernel call fails, which should not happen for a recognized kind.
#[allow(unsafe_code)]
pub(crate) fn read_rlimit(kind: svpr_core::LimitKind) -> svpr_core::LimitBound {
    let resource = rlimit_resource(kind);
    let mut current = nix::libc::rlimit { rlim_cur: 0, rlim_max: 0 };
    let ok = unsafe { nix::libc::getrlimit(resource as nix::libc::__rlimit_resource_t, &mut current) == 0 };
    if !ok {
        return svpr_core::LimitBound::default();
    }
    svpr_core::LimitBound { soft: Some(current.rlim_cur), hard: Some(current.rlim_max) }
}
