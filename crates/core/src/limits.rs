// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource-limit kinds recognized at spawn time (§4.4 step 4).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A recognized resource-limit kind, named after its POSIX `RLIMIT_*` /
/// `setrlimit(2)` counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    Cpu,
    FileSize,
    Data,
    StackSize,
    Core,
    ResidentSetSize,
    MemoryLock,
    NumFiles,
    NumProcesses,
    VirtualMemory,
}

impl LimitKind {
    /// Every recognized kind, for building a full readback table (§4.6
    /// `GetResourceLimits` "Current limits").
    pub const ALL: [LimitKind; 10] = [
        LimitKind::Cpu,
        LimitKind::FileSize,
        LimitKind::Data,
        LimitKind::StackSize,
        LimitKind::Core,
        LimitKind::ResidentSetSize,
        LimitKind::MemoryLock,
        LimitKind::NumFiles,
        LimitKind::NumProcesses,
        LimitKind::VirtualMemory,
    ];
}

crate::simple_display! {
    LimitKind {
        Cpu => "cpu",
        FileSize => "filesize",
        Data => "data",
        StackSize => "stack",
        Core => "core",
        ResidentSetSize => "rss",
        MemoryLock => "memlock",
        NumFiles => "numfiles",
        NumProcesses => "numproc",
        VirtualMemory => "as",
    }
}

/// Soft/hard bound pair. `None` means "leave the current value alone";
/// `rlim_infinity` is represented as `Some(u64::MAX)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitBound {
    pub soft: Option<u64>,
    pub hard: Option<u64>,
}

/// The resource-limit table carried by a job: one optional bound pair per
/// recognized [`LimitKind`]. Unlisted kinds are left at whatever the
/// supervisor's own limits were at fork time.
pub type ResourceLimits = BTreeMap<LimitKind, LimitBound>;

/// Two of the ten kinds also have a kernel-wide tunable counterpart that the
/// first-process supervisor propagates on `SetResourceLimits` (§4.6).
pub fn is_propagated_to_kernel(kind: LimitKind) -> bool {
    matches!(kind, LimitKind::NumProcesses | LimitKind::NumFiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn propagated_kinds_are_maxproc_and_maxfiles() {
        assert!(is_propagated_to_kernel(LimitKind::NumProcesses));
        assert!(is_propagated_to_kernel(LimitKind::NumFiles));
        assert!(!is_propagated_to_kernel(LimitKind::Cpu));
    }

    proptest! {
        // A `ResourceLimits` table is sent over the wire as JSON (§4.6
        // SetResourceLimits); any combination of bounds, including the
        // `rlim_infinity` sentinel, must round-trip exactly.
        #[test]
        fn limit_bound_round_trips_through_json(soft: Option<u64>, hard: Option<u64>) {
            let bound = LimitBound { soft, hard };
            let json = serde_json::to_string(&bound).unwrap();
            let back: LimitBound = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(bound, back);
        }
    }
}
