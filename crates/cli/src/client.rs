// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A thin connection to a supervisor's control socket: frame a [`Request`],
//! send it, decode the [`Response`].

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use svpr_wire::{decode_header, encode_header, ProtocolError, Request, Response, HEADER_LEN};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("cannot reach supervisor socket: {0}")]
    Connect(#[source] std::io::Error),
    #[error("io error talking to supervisor: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("unexpected reply: {0:?}")]
    UnexpectedReply(Response),
}

pub struct DaemonClient {
    stream: UnixStream,
}

impl DaemonClient {
    pub async fn connect(socket_path: &std::path::Path) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(socket_path).await.map_err(ClientError::Connect)?;
        tracing::debug!(socket = %socket_path.display(), "connected to supervisor");
        Ok(Self { stream })
    }

    /// Frame-encode `request`, send it, and decode the reply.
    pub async fn send(&mut self, request: &Request) -> Result<Response, ClientError> {
        tracing::debug!(?request, "sending request");
        let payload = serde_json::to_vec(request).map_err(ProtocolError::Decode)?;
        let header = encode_header(payload.len());
        self.stream.write_all(&header).await?;
        self.stream.write_all(&payload).await?;

        let mut header_buf = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut header_buf).await?;
        let payload_len = decode_header(&header_buf)?;

        let mut payload_buf = vec![0u8; payload_len as usize];
        self.stream.read_exact(&mut payload_buf).await?;
        let response: Response = serde_json::from_slice(&payload_buf).map_err(ProtocolError::Decode)?;
        Ok(response)
    }

    fn reject<T>(response: Response) -> Result<T, ClientError> {
        Err(ClientError::UnexpectedReply(response))
    }

    pub async fn submit(&mut self, job: svpr_core::JobConfig) -> Result<(), ClientError> {
        use svpr_wire::{JobSubmission, SubmitResult};
        let request = Request::SubmitJob { job: JobSubmission::Single(job) };
        match self.send(&request).await? {
            Response::Submitted { result: SubmitResult::Single(None) } => Ok(()),
            Response::Submitted { result: SubmitResult::Single(Some(error)) } => {
                Err(ClientError::UnexpectedReply(Response::Error { error }))
            }
            other => Self::reject(other),
        }
    }

    pub async fn start(&mut self, label: &str) -> Result<(), ClientError> {
        self.code_request(Request::StartJob { label: label.to_string() }).await
    }

    pub async fn stop(&mut self, label: &str) -> Result<(), ClientError> {
        self.code_request(Request::StopJob { label: label.to_string() }).await
    }

    pub async fn remove(&mut self, label: &str) -> Result<(), ClientError> {
        self.code_request(Request::RemoveJob { label: label.to_string() }).await
    }

    pub async fn get_job(&mut self, label: &str) -> Result<svpr_core::JobConfig, ClientError> {
        match self.send(&Request::GetJob { label: label.to_string() }).await? {
            Response::Job { config } => Ok(config),
            other => Self::reject(other),
        }
    }

    pub async fn list(&mut self) -> Result<std::collections::HashMap<String, svpr_core::JobConfig>, ClientError> {
        match self.send(&Request::GetJobs).await? {
            Response::Jobs { jobs } => Ok(jobs),
            other => Self::reject(other),
        }
    }

    pub async fn batch_control(&mut self, enabled: bool) -> Result<(), ClientError> {
        self.code_request(Request::BatchControl { enabled }).await
    }

    pub async fn batch_query(&mut self) -> Result<bool, ClientError> {
        match self.send(&Request::BatchQuery).await? {
            Response::Bool { value } => Ok(value),
            other => Self::reject(other),
        }
    }

    pub async fn shutdown(&mut self) -> Result<(), ClientError> {
        self.code_request(Request::Shutdown).await
    }

    async fn code_request(&mut self, request: Request) -> Result<(), ClientError> {
        match self.send(&request).await? {
            Response::Code { error: None } => Ok(()),
            Response::Code { error: Some(error) } => Err(ClientError::UnexpectedReply(Response::Error { error })),
            other => Self::reject(other),
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
