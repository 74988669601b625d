// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `svprd`: the supervisor binary. Parses its own CLI surface (§6), binds
//! the control socket for its identity, and runs the single-task event
//! loop described in `engine`/`lifecycle`/`listener`.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use fs2::FileExt;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use svpr_core::{policy, Job, JobConfig};
use svpr_daemon::demand::{DemandPortSource, NullDemandPortSource};
use svpr_daemon::engine::{Engine, EngineEvent};
use svpr_daemon::env::Identity;
use svpr_daemon::listener::Listener;
use svpr_daemon::{dispatch, lifecycle, pending_redirect};

/// `-s`, `-v`, `-x` are accepted on every run but only meaningful when this
/// process is PID 1 (§6); elsewhere they are recorded and ignored, matching
/// the Non-goal that excludes real boot sequencing.
#[derive(Debug, Parser)]
#[command(name = "svprd", about = "service supervisor engine")]
struct CliArgs {
    /// Daemonize: fork, detach from the controlling terminal, and continue
    /// running in the background.
    #[arg(short = 'd')]
    daemonize: bool,
    /// First-process-only: boot single-user.
    #[arg(short = 's')]
    single_user: bool,
    /// First-process-only: verbose boot.
    #[arg(short = 'v')]
    verbose_boot: bool,
    /// First-process-only: safe boot.
    #[arg(short = 'x')]
    safe_boot: bool,
    /// Trailing command: submitted as the firstborn job and started
    /// immediately.
    #[arg(last = true)]
    command: Vec<String>,
}

#[derive(Debug, Error)]
enum StartupError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("control socket has no parent directory")]
    NoSocketDir,
    #[error("daemonize failed: {0}")]
    Daemonize(#[source] nix::Error),
}

fn main() -> std::process::ExitCode {
    let args = CliArgs::parse();

    if args.daemonize {
        // Fork before the tokio runtime exists: a multi-threaded process
        // must not fork (§6 `-d`). The parent exits immediately; the child
        // detaches from its session and continues as the real daemon.
        if let Err(e) = daemonize() {
            eprintln!("svprd: failed to daemonize: {e}");
            return std::process::ExitCode::FAILURE;
        }
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("svprd: failed to start async runtime: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("svprd: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

/// Detach from the controlling terminal (§6 `-d`). A single fork plus
/// `setsid` is enough here: nothing downstream re-attaches a controlling
/// terminal the way a second fork guards against in classic daemonizing.
#[allow(unsafe_code)]
fn daemonize() -> Result<(), StartupError> {
    // SAFETY: called before any thread other than the main one exists.
    match unsafe { nix::unistd::fork() }.map_err(StartupError::Daemonize)? {
        nix::unistd::ForkResult::Parent { .. } => std::process::exit(0),
        nix::unistd::ForkResult::Child => {}
    }
    nix::unistd::setsid().map_err(StartupError::Daemonize)?;
    Ok(())
}

async fn run(args: CliArgs) -> Result<(), StartupError> {
    let identity = Identity::detect(None);
    if identity.is_first_process() {
        platform_init(args.single_user, args.verbose_boot, args.safe_boot);
    }

    let socket_path = identity.socket_path();
    let socket_dir = socket_path.parent().ok_or(StartupError::NoSocketDir)?.to_path_buf();
    std::fs::create_dir_all(&socket_dir)?;

    // §6 "the per-directory advisory lock serializes multiple supervisors
    // fighting for the same socket path".
    let lock_path = socket_dir.join("lock");
    let lock_file = std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(&lock_path)?;
    if lock_file.try_lock_exclusive().is_err() {
        eprintln!("svprd: another supervisor already owns {}", socket_dir.display());
        return Ok(());
    }

    let _log_guard = setup_logging(&socket_dir)?;
    info!(identity = ?identity, socket = %socket_path.display(), "starting");

    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let unix_listener = UnixListener::bind(&socket_path)?;

    let (events_tx, mut events_rx) = mpsc::channel::<EngineEvent>(1024);
    let mut engine = Engine::new(identity, events_tx.clone());

    if !args.command.is_empty() {
        let cfg = JobConfig { label: "firstborn".into(), program_arguments: args.command, ..Default::default() };
        let mut job = Job::new(cfg);
        job.runtime.firstborn = true;
        if let Err(e) = lifecycle::submit(&mut engine, job) {
            warn!(error = %e, "firstborn job failed to submit");
        }
    }

    let listener = Listener::new(unix_listener, events_tx.clone(), engine.next_conn_id.clone());
    tokio::spawn(listener.run());

    let (demand_tx, mut demand_rx) = mpsc::channel::<u32>(16);
    Box::new(NullDemandPortSource).spawn(demand_tx);
    let bridge_tx = events_tx.clone();
    tokio::spawn(async move {
        while let Some(tag) = demand_rx.recv().await {
            let _ = bridge_tx.send(EngineEvent::DemandPort { tag }).await;
        }
    });

    // Kept alive for the process lifetime: dropping it stops the watch.
    let _redirect_watcher = pending_redirect::spawn_watcher(&socket_dir, events_tx.clone()).ok();

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    if identity.is_first_process() {
        spawn_orphan_reaper();
    }

    let mut idle_since: Option<Instant> = None;
    let mut idle_poll = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            event = events_rx.recv() => {
                let Some(event) = event else { break };
                handle_event(&mut engine, event).await;
                if engine.should_exit_after_shutdown() {
                    info!("all jobs reaped after shutdown, exiting");
                    break;
                }
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                engine.begin_shutdown();
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                engine.begin_shutdown();
            }
            _ = sighup.recv() => {
                // §7: HUP reloads configuration (an external tool's job,
                // §6 "Configuration-file ingestion") and refreshes TTYs.
                info!("received SIGHUP, refreshing ttys");
                let _ = events_tx.send(EngineEvent::ReloadTtys).await;
            }
            _ = idle_poll.tick() => {
                if engine.idle_exit_eligible() {
                    let since = *idle_since.get_or_insert_with(Instant::now);
                    if since.elapsed() >= policy::IDLE_TIMEOUT {
                        info!("idle timeout reached, exiting");
                        break;
                    }
                } else {
                    idle_since = None;
                }
            }
        }
    }

    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
    }
    Ok(())
}

async fn handle_event(engine: &mut Engine, event: EngineEvent) {
    match event {
        EngineEvent::Request { conn, bound_label, request, reply } => {
            let response = dispatch::dispatch(engine, conn, bound_label.as_deref(), request);
            let _ = reply.send(response);
        }
        EngineEvent::ConnectionClosed { conn, was_batch_disabler } => {
            if was_batch_disabler {
                let was_enabled = engine.batch_enabled();
                engine.batch_disablers.remove(&conn);
                if !was_enabled && engine.batch_enabled() {
                    lifecycle::signal_batch_helper(engine, false);
                }
            }
        }
        EngineEvent::ChildExited { label, outcome } => {
            lifecycle::on_child_exited(engine, &label, outcome);
        }
        EngineEvent::ListenerReady { label, .. } => {
            lifecycle::on_listener_ready(engine, &label);
        }
        EngineEvent::ListenerEof { label, slot } => {
            lifecycle::on_listener_eof(engine, &label, slot);
        }
        EngineEvent::DemandPort { tag } => {
            warn!(tag, "demand port activity with no source registered");
        }
        EngineEvent::PendingRedirectsReady => {
            pending_redirect::apply(engine);
        }
        EngineEvent::ReloadTtys => {
            // No TTY ownership model in this build; nothing to refresh.
        }
        EngineEvent::ShutdownRequested => {
            engine.begin_shutdown();
        }
    }
}

fn platform_init(single_user: bool, verbose: bool, safe_boot: bool) {
    // The real boot sequence (mounting filesystems, running rc scripts) is
    // platform-specific and explicitly out of scope; this hook only exists
    // so the flags have somewhere to land.
    info!(single_user, verbose, safe_boot, "first-process boot hook (no-op)");
}

fn spawn_orphan_reaper() {
    tokio::spawn(async move {
        let Ok(mut sigchld) = signal(SignalKind::child()) else { return };
        loop {
            sigchld.recv().await;
            loop {
                match nix::sys::wait::waitpid(None, Some(nix::sys::wait::WaitPidFlag::WNOHANG)) {
                    Ok(nix::sys::wait::WaitStatus::StillAlive) | Err(_) => break,
                    Ok(nix::sys::wait::WaitStatus::Exited(pid, _))
                    | Ok(nix::sys::wait::WaitStatus::Signaled(pid, _, _)) => {
                        info!(pid = pid.as_raw(), "reaped adopted orphan");
                    }
                    Ok(_) => continue,
                }
            }
        }
    });
}

fn setup_logging(socket_dir: &std::path::Path) -> Result<tracing_appender::non_blocking::WorkerGuard, StartupError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_path: PathBuf = socket_dir.join("svprd.log");
    let parent = log_path.parent().ok_or(StartupError::NoSocketDir)?;
    std::fs::create_dir_all(parent)?;
    let file_appender = tracing_appender::rolling::never(parent, log_path.file_name().ok_or(StartupError::NoSocketDir)?);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer().with_writer(non_blocking)).init();

    Ok(guard)
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
