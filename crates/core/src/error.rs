// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The typed error taxonomy carried in control-channel replies.
//!
//! Request-level errors (§7) are encoded as a typed value in the reply and
//! never tear down the connection; transport-level errors (truncated
//! frames, bad magic) are a distinct [`ProtocolError`] in `svpr-wire` that
//! *does* tear down the connection.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A request-level error returned to the client inside a normal reply.
///
/// Mirrors the POSIX errno taxonomy the spec calls for, without actually
/// being `errno` — each variant carries its own code used only on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ReplyError {
    #[error("invalid request")]
    Invalid,
    #[error("unknown command")]
    NoSuchCommand,
    #[error("no such job")]
    NoSuchJob,
    #[error("job already exists")]
    AlreadyExists,
    #[error("not permitted on this connection")]
    NotPermitted,
    #[error("operation not permitted")]
    OperationNotPermitted,
}

impl ReplyError {
    /// Numeric code transmitted on the wire, chosen to match the errno the
    /// spec names for each case (EINVAL, ENOSYS, ESRCH, EEXIST, EACCES, EPERM).
    pub fn code(self) -> i32 {
        match self {
            ReplyError::Invalid => libc_errno::EINVAL,
            ReplyError::NoSuchCommand => libc_errno::ENOSYS,
            ReplyError::NoSuchJob => libc_errno::ESRCH,
            ReplyError::AlreadyExists => libc_errno::EEXIST,
            ReplyError::NotPermitted => libc_errno::EACCES,
            ReplyError::OperationNotPermitted => libc_errno::EPERM,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            libc_errno::EINVAL => ReplyError::Invalid,
            libc_errno::ENOSYS => ReplyError::NoSuchCommand,
            libc_errno::ESRCH => ReplyError::NoSuchJob,
            libc_errno::EEXIST => ReplyError::AlreadyExists,
            libc_errno::EACCES => ReplyError::NotPermitted,
            libc_errno::EPERM => ReplyError::OperationNotPermitted,
            _ => return None,
        })
    }
}

/// The small slice of errno values we mirror on the wire, kept local so
/// this crate doesn't need a libc dependency just for six constants.
mod libc_errno {
    pub const EINVAL: i32 = 22;
    pub const ENOSYS: i32 = 38;
    pub const ESRCH: i32 = 3;
    pub const EEXIST: i32 = 17;
    pub const EACCES: i32 = 13;
    pub const EPERM: i32 = 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_code() {
        for e in [
            ReplyError::Invalid,
            ReplyError::NoSuchCommand,
            ReplyError::NoSuchJob,
            ReplyError::AlreadyExists,
            ReplyError::NotPermitted,
            ReplyError::OperationNotPermitted,
        ] {
            assert_eq!(ReplyError::from_code(e.code()), Some(e));
        }
    }
}
