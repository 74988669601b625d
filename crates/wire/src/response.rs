// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reply shapes for each [`crate::Request`] variant (§4.6).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use svpr_core::{JobConfig, ReplyError, ResourceLimits};

/// Opaque `getrusage(2)` snapshot (§4.6 `GetRUsageSelf`/`GetRUsageChildren`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RUsageSnapshot {
    pub user_time_us: i64,
    pub system_time_us: i64,
    pub max_rss_kb: i64,
    pub minor_faults: i64,
    pub major_faults: i64,
    pub voluntary_ctx_switches: i64,
    pub involuntary_ctx_switches: i64,
}

/// `SubmitJob`'s reply mirrors its payload shape: a single config gets a
/// single code back, an array gets a parallel array of codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmitResult {
    Single(Option<ReplyError>),
    Many(Vec<Option<ReplyError>>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Submitted { result: SubmitResult },
    /// The bare "0, or ESRCH/EEXIST/..." replies most commands use.
    Code { error: Option<ReplyError> },
    Job { config: JobConfig },
    Jobs { jobs: HashMap<String, JobConfig> },
    Environment { vars: HashMap<String, String> },
    Mask { previous: i32 },
    UmaskValue { previous: u32 },
    RUsage { usage: RUsageSnapshot },
    ResourceLimits { limits: ResourceLimits },
    Bool { value: bool },
    Error { error: ReplyError },
}

impl Response {
    pub fn ok() -> Self {
        Response::Code { error: None }
    }

    pub fn err(error: ReplyError) -> Self {
        Response::Error { error }
    }
}
