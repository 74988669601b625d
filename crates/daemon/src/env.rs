// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process identity, environment-variable names, and path resolution (§6).

use std::path::PathBuf;

/// Holds the descriptor number of the check-in socketpair's supervisor-side
/// endpoint, set in a spawned child's environment when `service_ipc` or
/// `inet_compat` is configured.
pub const TRUSTED_FD_ENV: &str = "SVPR_TRUSTED_FD";

/// Points a per-session agent's administrative clients at its control
/// socket, since that path is not a well-known constant.
pub const SOCKET_ENV: &str = "SVPR_SOCKET";

/// Override for the root under which control sockets are created; falls
/// back to a fixed system path when unset. Kept as an environment knob
/// rather than a config file per the "no configuration-file parsing"
/// non-goal.
pub const SOCKET_PREFIX_ENV: &str = "SVPR_SOCKET_PREFIX";

const DEFAULT_SOCKET_PREFIX: &str = "/var/run/svprd";

/// Who this process is, decided once at startup (§3 "SupervisorIdentity").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// Running as the system's first process (PID 1).
    FirstProcess,
    /// A per-user agent with no distinguishing session.
    PerUser { uid: u32 },
    /// A per-session agent anchored to the pid that launched it.
    PerSession { uid: u32, anchor_pid: u32 },
}

impl Identity {
    pub fn detect(anchor_pid: Option<u32>) -> Self {
        let pid = std::process::id();
        if pid == 1 {
            return Identity::FirstProcess;
        }
        let uid = current_uid();
        match anchor_pid {
            Some(anchor) => Identity::PerSession { uid, anchor_pid: anchor },
            None => Identity::PerUser { uid },
        }
    }

    pub fn is_first_process(self) -> bool {
        matches!(self, Identity::FirstProcess)
    }

    /// The control-socket path for this identity (§6): `${PREFIX}/sock` for
    /// the first process, `${PREFIX}/<uid>/sock` per-user, or
    /// `${PREFIX}/<uid>.<pid>/sock` per-session.
    pub fn socket_path(self) -> PathBuf {
        let prefix = socket_prefix();
        match self {
            Identity::FirstProcess => prefix.join("sock"),
            Identity::PerUser { uid } => prefix.join(uid.to_string()).join("sock"),
            Identity::PerSession { uid, anchor_pid } => {
                prefix.join(format!("{uid}.{anchor_pid}")).join("sock")
            }
        }
    }
}

fn socket_prefix() -> PathBuf {
    std::env::var(SOCKET_PREFIX_ENV).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(DEFAULT_SOCKET_PREFIX))
}

fn current_uid() -> u32 {
    nix::unistd::getuid().as_raw()
}
