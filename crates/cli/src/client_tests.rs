// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use svpr_wire::{decode_header, encode_header, Response, HEADER_LEN};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;

/// Accepts one connection, reads one frame (discarded), and replies with
/// `response`.
async fn serve_one(listener: UnixListener, response: Response) {
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).await.unwrap();
    let len = decode_header(&header).unwrap();
    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await.unwrap();

    let reply_payload = serde_json::to_vec(&response).unwrap();
    let reply_header = encode_header(reply_payload.len());
    stream.write_all(&reply_header).await.unwrap();
    stream.write_all(&reply_payload).await.unwrap();
}

#[tokio::test]
async fn list_decodes_jobs_response() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sock");
    let listener = UnixListener::bind(&path).unwrap();

    let jobs = std::collections::HashMap::from([(
        "echo".to_string(),
        svpr_core::JobConfig { label: "echo".into(), ..Default::default() },
    )]);
    let server = tokio::spawn(serve_one(listener, Response::Jobs { jobs: jobs.clone() }));

    let mut client = DaemonClient::connect(&path).await.unwrap();
    let got = client.list().await.unwrap();
    assert_eq!(got.len(), 1);
    assert!(got.contains_key("echo"));

    server.await.unwrap();
}

#[tokio::test]
async fn unexpected_reply_shape_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sock");
    let listener = UnixListener::bind(&path).unwrap();
    let server = tokio::spawn(serve_one(listener, Response::Bool { value: true }));

    let mut client = DaemonClient::connect(&path).await.unwrap();
    let err = client.list().await.unwrap_err();
    assert!(matches!(err, ClientError::UnexpectedReply(_)));

    server.await.unwrap();
}
