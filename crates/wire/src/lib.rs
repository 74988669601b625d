// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types for the administrative control channel (§4.6, §6).
//!
//! This crate carries no transport or OS dependency: it only knows how to
//! frame and (de)serialize requests and replies. The listener in
//! `svpr-daemon` owns the socket, the ancillary fd passing, and the
//! `FdSlot` <-> real-descriptor bookkeeping.

mod fd_slot;
mod frame;
mod request;
mod response;

pub use fd_slot::FdSlot;
pub use frame::{decode_header, encode_header, ProtocolError, FRAME_MAGIC, HEADER_LEN, MAX_FRAME_LEN};
pub use request::{JobSubmission, Request, StdTarget};
pub use response::{RUsageSnapshot, Response, SubmitResult};

#[cfg(test)]
mod tests {
    use super::*;
    use svpr_core::JobConfig;

    #[test]
    fn request_round_trips_through_json() {
        let req = Request::SubmitJob {
            job: JobSubmission::Single(JobConfig {
                label: "com.example.echo".into(),
                program_arguments: vec!["/bin/echo".into(), "hi".into()],
                ..Default::default()
            }),
        };
        let bytes = serde_json::to_vec(&req).unwrap();
        let back: Request = serde_json::from_slice(&bytes).unwrap();
        match back {
            Request::SubmitJob { job: JobSubmission::Single(cfg) } => {
                assert_eq!(cfg.label, "com.example.echo");
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn submit_job_array_round_trips() {
        let req = Request::SubmitJob {
            job: JobSubmission::Many(vec![
                JobConfig { label: "a".into(), program_arguments: vec!["/bin/true".into()], ..Default::default() },
                JobConfig { label: "b".into(), program_arguments: vec!["/bin/true".into()], ..Default::default() },
            ]),
        };
        let bytes = serde_json::to_vec(&req).unwrap();
        let back: Request = serde_json::from_slice(&bytes).unwrap();
        assert!(matches!(back, Request::SubmitJob { job: JobSubmission::Many(v) } if v.len() == 2));
    }

    #[test]
    fn response_code_round_trips() {
        let resp = Response::ok();
        let bytes = serde_json::to_vec(&resp).unwrap();
        let back: Response = serde_json::from_slice(&bytes).unwrap();
        assert!(matches!(back, Response::Code { error: None }));
    }

    #[test]
    fn header_and_payload_compose() {
        let payload = serde_json::to_vec(&Request::GetJobs).unwrap();
        let header = encode_header(payload.len());
        let payload_len = decode_header(&header).unwrap();
        assert_eq!(payload_len as usize, payload.len());
    }
}
