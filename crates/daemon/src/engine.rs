// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The engine aggregate: every piece of process-wide mutable state, owned
//! by the one task that runs the event loop (§9 "Global mutable state").

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use svpr_core::{Clock, SystemClock};
use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::env::Identity;
use crate::registry::JobRegistry;

pub type ConnectionId = u64;

/// Outcome of a reaped child, handed to the lifecycle engine's post-reap
/// decision (§4.4).
#[derive(Debug, Clone, Copy)]
pub enum ExitOutcome {
    Exited(i32),
    Signaled(i32),
}

impl ExitOutcome {
    /// "A failed exit is: exit with a non-zero status, or termination by a
    /// signal other than the stop signal or kill" (§4.4).
    pub fn is_failed(self, stop_signal: i32) -> bool {
        match self {
            ExitOutcome::Exited(code) => code != 0,
            ExitOutcome::Signaled(sig) => sig != stop_signal && sig != nix::libc::SIGKILL,
        }
    }
}

/// Everything pushed onto the single channel the event loop selects
/// against (§4.1): the tagged-callback design realized as an enum.
pub enum EngineEvent {
    /// A connection parsed a frame and wants a reply (§4.6).
    Request {
        conn: ConnectionId,
        bound_label: Option<String>,
        request: svpr_wire::Request,
        reply: oneshot::Sender<svpr_wire::Response>,
    },
    ConnectionClosed { conn: ConnectionId, was_batch_disabler: bool },
    ChildExited { label: String, outcome: ExitOutcome },
    ListenerReady { label: String, slot: usize },
    ListenerEof { label: String, slot: usize },
    DemandPort { tag: u32 },
    PendingRedirectsReady,
    ReloadTtys,
    ShutdownRequested,
}

/// The process-wide state a launchd-style supervisor carries (§3, §9):
/// the registry, the pending stdout/stderr slots, the batch-disabler
/// count, and the shutdown flag, gathered into one struct instead of
/// module-level globals so the whole thing is testable in-process.
pub struct Engine {
    pub identity: Identity,
    pub registry: JobRegistry,
    pub clock: Box<dyn Clock>,
    pub shutting_down: bool,
    pub pending_stdout: Option<PathBuf>,
    pub pending_stderr: Option<PathBuf>,
    pub batch_disablers: HashSet<ConnectionId>,
    pub log_mask: i32,
    pub umask: u32,
    pub firstborn_label: Option<String>,
    /// §4.6 `BatchControl`: the job signaled STOP/CONT as the aggregate
    /// batch-enabled state toggles. At most the most recently submitted
    /// `batch_helper` job is tracked.
    pub batch_helper_label: Option<String>,
    /// Labels awaiting reply on their check-in connection; cleared on
    /// check-in or on first exit without one (§4.4 "Check-in contract").
    pub check_ins_pending: HashMap<String, ConnectionId>,
    /// The same channel the listener and the reaper push onto; handed to
    /// spawn so a freshly started job's exit-watch task can report back
    /// without threading a sender through every lifecycle call (§4.1).
    pub events: mpsc::Sender<EngineEvent>,
    /// Shared with [`crate::listener::Listener`] so accepted connections
    /// and check-in connections opened out of `lifecycle::start` draw from
    /// the same id space (§4.6 `CheckIn`).
    pub next_conn_id: Arc<AtomicU64>,
}

impl Engine {
    pub fn new(identity: Identity, events: mpsc::Sender<EngineEvent>) -> Self {
        Self {
            identity,
            registry: JobRegistry::new(),
            clock: Box::new(SystemClock),
            shutting_down: false,
            pending_stdout: None,
            pending_stderr: None,
            batch_disablers: HashSet::new(),
            log_mask: 0,
            umask: 0o022,
            firstborn_label: None,
            batch_helper_label: None,
            check_ins_pending: HashMap::new(),
            events,
            next_conn_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Allocate a fresh connection id from the shared counter (§4.6
    /// `CheckIn`: the spawn-opened check-in connection needs one too).
    pub fn alloc_conn_id(&self) -> ConnectionId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    #[cfg(test)]
    pub fn with_clock(identity: Identity, clock: Box<dyn Clock>) -> Self {
        let (events, _rx) = mpsc::channel(16);
        let mut engine = Self::new(identity, events);
        engine.clock = clock;
        engine
    }

    pub fn batch_enabled(&self) -> bool {
        self.batch_disablers.is_empty()
    }

    /// Should the loop keep blocking with no timeout, or wind down after an
    /// idle period (§4.1)? Only a non-first-process agent with an empty
    /// registry gets the 30 s idle exit.
    pub fn idle_exit_eligible(&self) -> bool {
        !self.identity.is_first_process() && self.registry.is_empty() && !self.shutting_down
    }

    /// §4.7: flip every job to non-demand and signal TERM to running
    /// children. The event loop keeps running; the caller exits once the
    /// running count reaches zero.
    pub fn begin_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        info!("shutdown requested, signaling all running jobs");
        for (label, job) in self.registry.iter() {
            let _ = label;
            if let Some(pid) = job.runtime.pid {
                let _ = nix::sys::signal::kill(
                    nix::unistd::Pid::from_raw(pid as i32),
                    nix::sys::signal::Signal::SIGTERM,
                );
            }
        }
        // `on_demand` is only consulted by the post-reap decision, so
        // clearing it here is enough to prevent any later rearm.
        for (_, job) in self.registry.iter_mut() {
            job.config.on_demand = false;
        }
    }

    pub fn should_exit_after_shutdown(&self) -> bool {
        self.shutting_down && self.registry.running_count() == 0 && !self.identity.is_first_process()
    }
}
