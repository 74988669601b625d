// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job identifier, configuration, and runtime state (§3 Data model).

use crate::limits::ResourceLimits;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Where a job's stdout/stderr is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StdRedirect {
    /// Open this path with append+create before exec.
    Path(PathBuf),
    /// `dup2` this already-open descriptor (only valid for handles passed
    /// in the same submit, never serialized back out).
    #[serde(skip)]
    Fd(i32),
}

/// A listening descriptor contributed by the client at submit time.
///
/// The numeric value is populated on receive from the ancillary payload;
/// once revoked (stale EOF, §4.5) it becomes `None` and is never re-armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenSocket {
    pub slot: usize,
    #[serde(skip)]
    pub fd: Option<i32>,
}

impl ListenSocket {
    pub fn new(slot: usize, fd: i32) -> Self {
        Self { slot, fd: Some(fd) }
    }

    pub fn is_valid(&self) -> bool {
        self.fd.is_some()
    }

    pub fn revoke(&mut self) {
        self.fd = None;
    }
}

/// Client-supplied job configuration (everything submit may set).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobConfig {
    pub label: String,
    pub program: Option<PathBuf>,
    #[serde(default)]
    pub program_arguments: Vec<String>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    pub working_directory: Option<PathBuf>,
    pub root_directory: Option<PathBuf>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub umask: Option<u32>,
    pub nice: Option<i32>,
    #[serde(default)]
    pub low_priority_io: bool,
    pub stdout: Option<StdRedirect>,
    pub stderr: Option<StdRedirect>,
    #[serde(default)]
    pub resource_limits: ResourceLimits,
    #[serde(default)]
    pub on_demand: bool,
    #[serde(default)]
    pub service_ipc: bool,
    #[serde(default)]
    pub inet_compat: bool,
    #[serde(default)]
    pub session_create: bool,
    #[serde(default)]
    pub init_groups: bool,
    pub checkin_timeout: Option<Duration>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub sockets: Vec<ListenSocket>,
    /// Marks this as the job `BatchControl` pauses/resumes (§4.6, at most
    /// one such job is meaningful; submitting a second one just replaces
    /// which label the engine tracks).
    #[serde(default)]
    pub batch_helper: bool,
}

impl JobConfig {
    /// §4.6 SubmitJob boundary check: a job without a program to run is
    /// invalid no matter what else it sets.
    pub fn validate(&self) -> bool {
        !self.label.is_empty() && (!self.program_arguments.is_empty() || self.program.is_some())
    }

    /// Strip live descriptor values for replies that must not leak fds
    /// (`GetJob`, `GetJobs`) while keeping the slot bookkeeping visible.
    pub fn without_handles(&self) -> Self {
        let mut stripped = self.clone();
        for s in &mut stripped.sockets {
            s.fd = None;
        }
        stripped
    }
}

/// Where a job sits in the state machine (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// `on_demand`, not running, listeners armed.
    IdleWatching,
    /// pid != 0.
    Running,
    /// Exit seen, reap decision pending.
    Reaping,
    /// Scheduled for removal; freed once reaped.
    Terminal,
}

crate::simple_display! {
    JobState {
        IdleWatching => "idle",
        Running => "running",
        Reaping => "reaping",
        Terminal => "terminal",
    }
}

/// Engine-owned runtime attributes, never set by the client (§3).
#[derive(Debug, Clone)]
pub struct JobRuntime {
    pub state: JobState,
    pub pid: Option<u32>,
    pub last_start: Option<Instant>,
    pub last_run_duration: Option<Duration>,
    pub failed_exits: u32,
    pub checked_in: bool,
    pub firstborn: bool,
}

impl Default for JobRuntime {
    fn default() -> Self {
        Self {
            state: JobState::Running,
            pid: None,
            last_start: None,
            last_run_duration: None,
            failed_exits: 0,
            checked_in: false,
            firstborn: false,
        }
    }
}

impl JobRuntime {
    pub fn idle(on_demand: bool) -> Self {
        Self { state: if on_demand { JobState::IdleWatching } else { JobState::Running }, ..Self::default() }
    }

    pub fn is_running(&self) -> bool {
        self.pid.is_some()
    }
}

/// A job: its configuration plus the engine's view of its runtime state.
#[derive(Debug, Clone)]
pub struct Job {
    pub config: JobConfig,
    pub runtime: JobRuntime,
}

impl Job {
    pub fn new(config: JobConfig) -> Self {
        let on_demand = config.on_demand;
        Self { config, runtime: JobRuntime::idle(on_demand) }
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_program() {
        let cfg = JobConfig { label: "x".into(), ..Default::default() };
        assert!(!cfg.validate());
    }

    #[test]
    fn validate_accepts_program_arguments() {
        let cfg =
            JobConfig { label: "x".into(), program_arguments: vec!["/bin/true".into()], ..Default::default() };
        assert!(cfg.validate());
    }

    #[test]
    fn new_job_on_demand_starts_idle() {
        let cfg = JobConfig {
            label: "d".into(),
            program_arguments: vec!["/bin/true".into()],
            on_demand: true,
            ..Default::default()
        };
        let job = Job::new(cfg);
        assert_eq!(job.runtime.state, JobState::IdleWatching);
    }

    #[test]
    fn without_handles_strips_socket_fds() {
        let mut cfg = JobConfig { label: "s".into(), ..Default::default() };
        cfg.sockets.push(ListenSocket::new(0, 7));
        let stripped = cfg.without_handles();
        assert!(!stripped.sockets[0].is_valid());
        assert!(cfg.sockets[0].is_valid());
    }
}
