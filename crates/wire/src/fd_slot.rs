// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Placeholder for a file descriptor carried as ancillary data.
//!
//! The byte stream never contains a raw descriptor value — it contains the
//! index of that descriptor within the frame's out-of-band ancillary
//! payload. The transport re-links slots to real descriptors on receive
//! (§6 "Frame format").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FdSlot(pub u32);

impl FdSlot {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for FdSlot {
    fn from(i: usize) -> Self {
        FdSlot(i as u32)
    }
}
