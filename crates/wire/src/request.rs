// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The control-channel command vocabulary (§4.6).

use crate::fd_slot::FdSlot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use svpr_core::{JobConfig, ResourceLimits};

/// `SubmitJob`'s payload is either one job config or an array of them; the
/// reply shape tracks which was sent (§9 Open Questions: "preserve that
/// asymmetry").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobSubmission {
    Single(JobConfig),
    Many(Vec<JobConfig>),
}

/// Where a `SetStdOut`/`SetStdErr` request points the supervisor's stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum StdTarget {
    Path(String),
    Fd(FdSlot),
}

/// Request from an administrative client to the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    SubmitJob { job: JobSubmission },
    StartJob { label: String },
    StopJob { label: String },
    RemoveJob { label: String },
    /// Only meaningful on a connection bound to a job (the check-in socket).
    CheckIn,
    GetJob { label: String },
    GetJobWithHandles { label: String },
    GetJobs,
    GetUserEnvironment,
    SetUserEnvironment { vars: HashMap<String, String> },
    UnsetUserEnvironment { key: String },
    SetLogMask { mask: i32 },
    GetLogMask,
    SetUmask { mask: u32 },
    GetUmask,
    GetRUsageSelf,
    GetRUsageChildren,
    SetStdOut { target: StdTarget },
    SetStdErr { target: StdTarget },
    SetResourceLimits { limits: ResourceLimits },
    GetResourceLimits,
    BatchControl { enabled: bool },
    BatchQuery,
    ReloadTTYs,
    Shutdown,
}
