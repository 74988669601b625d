// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-demand listener readiness watches (§4.5): one watch task per idle
//! job's socket, unregistered the moment it fires.

use std::os::unix::io::{AsRawFd, RawFd};

use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::sync::mpsc;
use tracing::warn;

use crate::engine::EngineEvent;

/// A bare descriptor number wrapped just enough to register with the
/// reactor; dropping it never closes the underlying fd, which stays owned
/// by the job's `ListenSocket` entry.
struct BorrowedListener(RawFd);

impl AsRawFd for BorrowedListener {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

/// Arm a read-readiness watch on `fd` for `label`'s socket at `slot`. Fires
/// exactly one of `ListenerReady`/`ListenerEof` and then exits; re-arming
/// after the job goes back to idle is the caller's job.
pub fn watch_socket(label: String, slot: usize, fd: RawFd, events: mpsc::Sender<EngineEvent>) {
    tokio::spawn(async move {
        let async_fd = match AsyncFd::with_interest(BorrowedListener(fd), Interest::READABLE) {
            Ok(a) => a,
            Err(e) => {
                warn!(label, slot, error = %e, "failed to arm on-demand watch");
                return;
            }
        };
        let guard = match async_fd.readable().await {
            Ok(g) => g,
            Err(e) => {
                warn!(label, slot, error = %e, "on-demand watch failed");
                return;
            }
        };
        drop(guard);

        // Distinguish a stale, EOF'd listener (peek returns 0) from real
        // activity (§4.5 "on EOF with zero pending bytes ... revoked").
        let mut probe = [0u8; 1];
        let peeked = nix::sys::socket::recv(fd, &mut probe, nix::sys::socket::MsgFlags::MSG_PEEK | nix::sys::socket::MsgFlags::MSG_DONTWAIT);
        let event = match peeked {
            Ok(0) => EngineEvent::ListenerEof { label, slot },
            _ => EngineEvent::ListenerReady { label, slot },
        };
        let _ = events.send(event).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    #[tokio::test]
    async fn readable_peer_fires_listener_ready() {
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        b.set_nonblocking(true).unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        watch_socket("job".into(), 0, a.as_raw_fd(), tx);
        std::io::Write::write_all(&mut &b, b"x").unwrap();
        let event = tokio::time::timeout(std::time::Duration::from_millis(500), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(event, EngineEvent::ListenerReady { slot: 0, .. }));
        drop(a);
        drop(b);
    }

    #[tokio::test]
    async fn closed_peer_fires_listener_eof() {
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        watch_socket("job".into(), 1, a.as_raw_fd(), tx);
        drop(b);
        let event = tokio::time::timeout(std::time::Duration::from_millis(500), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(event, EngineEvent::ListenerEof { slot: 1, .. }));
        drop(a);
    }
}
