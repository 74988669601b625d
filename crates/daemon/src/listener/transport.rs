// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Framed I/O with ancillary descriptor passing over the control socket
//! (§4.2, §6).
//!
//! Plain buffered reads can't see `SCM_RIGHTS` ancillary data — only
//! `recvmsg(2)` does, and POSIX delivers a sendmsg call's ancillary payload
//! entirely on whichever `recvmsg` call reads that call's first byte. So
//! this transport talks `recvmsg`/`sendmsg` directly against the raw
//! descriptor, bridged to tokio readiness via `AsyncFd`, rather than
//! `tokio::net::UnixStream`'s buffered `AsyncRead`/`AsyncWrite`.

use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream as StdUnixStream;

use nix::cmsg_space;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::sys::socket::{recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags};
use std::io::IoSlice;
use tokio::io::unix::AsyncFd;

use svpr_wire::{decode_header, encode_header, ProtocolError, HEADER_LEN};

pub struct Transport {
    inner: AsyncFd<StdUnixStream>,
}

impl Transport {
    pub fn new(stream: StdUnixStream) -> std::io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self { inner: AsyncFd::new(stream)? })
    }

    pub fn raw_fd(&self) -> RawFd {
        self.inner.get_ref().as_raw_fd()
    }

    /// Read one complete frame, returning its payload bytes and any
    /// descriptors carried as ancillary data.
    pub async fn recv_frame(&mut self) -> Result<(Vec<u8>, Vec<RawFd>), ProtocolError> {
        let mut buf = vec![0u8; HEADER_LEN];
        let mut filled = 0usize;
        let mut fds = Vec::new();

        // Header first: no fds ever accompany it alone in this protocol,
        // but we still collect whatever recvmsg hands back for uniformity.
        self.fill(&mut buf, &mut filled, &mut fds).await?;
        let header: [u8; HEADER_LEN] = buf[..HEADER_LEN].try_into().expect("sized above");
        let payload_len = decode_header(&header)? as usize;

        buf.resize(HEADER_LEN + payload_len, 0);
        self.fill(&mut buf, &mut filled, &mut fds).await?;

        Ok((buf[HEADER_LEN..].to_vec(), fds))
    }

    async fn fill(&mut self, buf: &mut [u8], filled: &mut usize, fds: &mut Vec<RawFd>) -> Result<(), ProtocolError> {
        while *filled < buf.len() {
            let mut guard = self.inner.readable().await.map_err(|_| ProtocolError::TruncatedAncillary)?;
            let target = *filled;
            let result = guard.try_io(|inner| {
                let fd = inner.get_ref().as_raw_fd();
                let mut cmsg_buf = cmsg_space!([RawFd; 16]);
                let mut iov = [std::io::IoSliceMut::new(&mut buf[target..])];
                let msg = recvmsg::<()>(fd, &mut iov, Some(&mut cmsg_buf), MsgFlags::empty())
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
                let bytes = msg.bytes;
                let cmsgs: Vec<ControlMessageOwned> = msg
                    .cmsgs()
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?
                    .collect();
                Ok((bytes, cmsgs))
            });
            match result {
                Ok(Ok((bytes, cmsgs))) => {
                    if bytes == 0 {
                        return Err(ProtocolError::TruncatedAncillary);
                    }
                    *filled += bytes;
                    for cmsg in cmsgs {
                        if let ControlMessageOwned::ScmRights(received) = cmsg {
                            // §5: descriptors passed over the control channel
                            // are marked close-on-exec as soon as they're
                            // received, before they can reach any submit/set
                            // path that later hands them to a spawned child.
                            for fd in &received {
                                let _ = fcntl(*fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC));
                            }
                            fds.extend(received);
                        }
                    }
                }
                Ok(Err(_)) => return Err(ProtocolError::TruncatedAncillary),
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }

    /// Write one complete frame, attaching `fds` as ancillary data on the
    /// single `sendmsg` call that carries the frame's first byte.
    pub async fn send_frame(&mut self, payload: &[u8], fds: &[RawFd]) -> Result<(), ProtocolError> {
        let header = encode_header(payload.len());
        let mut message = Vec::with_capacity(header.len() + payload.len());
        message.extend_from_slice(&header);
        message.extend_from_slice(payload);

        let mut sent = 0usize;
        let mut first = true;
        while sent < message.len() {
            let mut guard = self.inner.writable().await.map_err(|_| ProtocolError::TruncatedAncillary)?;
            let chunk = &message[sent..];
            let cmsgs: Vec<ControlMessage> = if first && !fds.is_empty() {
                vec![ControlMessage::ScmRights(fds)]
            } else {
                Vec::new()
            };
            let result = guard.try_io(|inner| {
                let fd = inner.get_ref().as_raw_fd();
                let iov = [IoSlice::new(chunk)];
                sendmsg::<()>(fd, &iov, &cmsgs, MsgFlags::empty(), None)
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
            });
            match result {
                Ok(Ok(n)) => {
                    sent += n;
                    first = false;
                }
                Ok(Err(_)) => return Err(ProtocolError::TruncatedAncillary),
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }
}
