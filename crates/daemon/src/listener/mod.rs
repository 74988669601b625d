// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Accepts control-channel connections and turns each frame into an
//! [`EngineEvent`] sent to the single event-loop task (§4.2).

mod transport;

use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::UnixListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use svpr_wire::{ProtocolError, Request};

use crate::engine::{ConnectionId, EngineEvent};

pub use transport::Transport;

pub struct Listener {
    socket: UnixListener,
    events: mpsc::Sender<EngineEvent>,
    next_conn_id: Arc<AtomicU64>,
}

impl Listener {
    /// `next_conn_id` is shared with [`crate::engine::Engine`] so accepted
    /// connections and the check-in connection opened from
    /// `lifecycle::start` never collide on the same id.
    pub fn new(socket: UnixListener, events: mpsc::Sender<EngineEvent>, next_conn_id: Arc<AtomicU64>) -> Self {
        Self { socket, events, next_conn_id }
    }

    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, _addr)) => {
                    let conn = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
                    let events = self.events.clone();
                    let std_stream = match stream.into_std() {
                        Ok(s) => s,
                        Err(e) => {
                            warn!(error = %e, "failed to convert accepted connection");
                            continue;
                        }
                    };
                    tokio::spawn(async move {
                        handle_connection(conn, std_stream, events, None).await;
                    });
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
    }
}

/// Drive one connection to completion: decode frames, forward requests to
/// the engine, encode replies, until the peer disconnects or a transport
/// error tears the connection down (§4.2 "Errors").
///
/// `bound_label` is `Some` only for the secondary connection opened during
/// spawn so a child can check in (§3 "Connection", §4.6 `CheckIn`).
pub async fn handle_connection(
    conn: ConnectionId,
    stream: std::os::unix::net::UnixStream,
    events: mpsc::Sender<EngineEvent>,
    bound_label: Option<String>,
) {
    let mut transport = match Transport::new(stream) {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "failed to prepare connection transport");
            return;
        }
    };
    let mut was_batch_disabler = false;

    loop {
        let (payload, fds) = match transport.recv_frame().await {
            Ok(f) => f,
            Err(ProtocolError::TruncatedAncillary) => break,
            Err(e) => {
                debug!(conn, error = %e, "connection closed with protocol error");
                break;
            }
        };

        let mut request: Request = match serde_json::from_slice(&payload) {
            Ok(r) => r,
            Err(e) => {
                debug!(conn, error = %e, "bad RPC, dropping connection");
                break;
            }
        };
        relink_submitted_sockets(&mut request, &fds);
        if matches!(request, Request::BatchControl { enabled: false }) {
            was_batch_disabler = true;
        }
        if matches!(request, Request::BatchControl { enabled: true }) {
            was_batch_disabler = false;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = events
            .send(EngineEvent::Request { conn, bound_label: bound_label.clone(), request, reply: reply_tx })
            .await;
        if sent.is_err() {
            break;
        }
        let Ok(response) = reply_rx.await else { break };

        let bytes = match serde_json::to_vec(&response) {
            Ok(b) => b,
            Err(e) => {
                warn!(conn, error = %e, "failed to encode reply");
                break;
            }
        };
        if transport.send_frame(&bytes, &[]).await.is_err() {
            break;
        }
    }

    let _ = events.send(EngineEvent::ConnectionClosed { conn, was_batch_disabler }).await;
}

/// `SubmitJob`'s sockets arrive with placeholder slots in the JSON payload
/// and their real descriptors as ancillary data on the same frame (§6
/// "file descriptors are transported as ancillary data ... the byte stream
/// carries placeholders that the codec re-links ... on receive"). The same
/// treatment applies to `SetStdOut`/`SetStdErr`'s `FdSlot`: its index is
/// overwritten in place with the real descriptor number once resolved.
fn relink_submitted_sockets(request: &mut Request, fds: &[RawFd]) {
    use svpr_wire::{JobSubmission, StdTarget};
    match request {
        Request::SubmitJob { job: JobSubmission::Single(cfg) } => relink_config(cfg, fds),
        Request::SubmitJob { job: JobSubmission::Many(cfgs) } => {
            for cfg in cfgs {
                relink_config(cfg, fds);
            }
        }
        Request::SetStdOut { target: StdTarget::Fd(slot) } | Request::SetStdErr { target: StdTarget::Fd(slot) } => {
            if let Some(&fd) = fds.get(slot.index()) {
                *slot = (fd as usize).into();
            }
        }
        _ => {}
    }
}

fn relink_config(cfg: &mut svpr_core::JobConfig, fds: &[RawFd]) {
    for socket in &mut cfg.sockets {
        if let Some(&fd) = fds.get(socket.slot) {
            socket.fd = Some(fd);
        }
    }
}
