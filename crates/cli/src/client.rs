// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection and request/response plumbing for talking to `bsdd`.

use std::path::PathBuf;

use bsd_daemon::protocol::{read_response, write_request, ProtocolError};
use bsd_wire::{Request, Response, StatusCode};
use thiserror::Error;
use tokio::net::UnixStream;

use crate::exit_error::ExitError;

/// Connect to the daemon, or fail with the exit code commands should surface
/// for "nothing is running" rather than a generic protocol error.
pub async fn connect_or_exit() -> Result<DaemonClient, ExitError> {
    DaemonClient::connect().await.map_err(|e| match e {
        ClientError::NotRunning(_) => ExitError::new(2, "bsdd is not running"),
        other => ExitError::new(1, other.to_string()),
    })
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("bsdd is not running (no socket at {0})")]
    NotRunning(PathBuf),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("daemon rejected the request: status {0:?}")]
    Rejected(StatusCode),
    #[error("unexpected response from daemon: {0:?}")]
    UnexpectedResponse(Response),
}

/// A connection to the running daemon's root (or a subset's) socket.
pub struct DaemonClient {
    stream: UnixStream,
    timeout: std::time::Duration,
}

impl DaemonClient {
    /// Connect to the root daemon socket resolved from the environment.
    pub async fn connect() -> Result<Self, ClientError> {
        let socket_path = crate::env::socket_path().map_err(|_| ClientError::NotRunning(PathBuf::new()))?;
        Self::connect_to(&socket_path).await
    }

    pub async fn connect_to(socket_path: &std::path::Path) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|_| ClientError::NotRunning(socket_path.to_path_buf()))?;
        Ok(Self { stream, timeout: bsd_daemon::env::ipc_timeout() })
    }

    async fn send(&mut self, request: &Request) -> Result<Response, ClientError> {
        write_request(&mut self.stream, request, self.timeout).await?;
        Ok(read_response(&mut self.stream, self.timeout).await?)
    }

    fn reject<T>(response: Response) -> Result<T, ClientError> {
        if let Response::Error { status } = response {
            Err(ClientError::Rejected(status))
        } else {
            Err(ClientError::UnexpectedResponse(response))
        }
    }

    pub async fn hello(&mut self) -> Result<String, ClientError> {
        let request = Request::Hello { version: bsd_daemon::env::PROTOCOL_VERSION.to_string() };
        match self.send(&request).await? {
            Response::Hello { version } => Ok(version),
            other => Self::reject(other),
        }
    }

    pub async fn ping(&mut self) -> Result<(), ClientError> {
        match self.send(&Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn create_server(
        &mut self,
        command: Vec<String>,
        argv0: Option<String>,
        uid: u32,
        on_demand: bool,
    ) -> Result<(), ClientError> {
        let request = Request::CreateServer { command, argv0, uid, on_demand };
        match self.send(&request).await? {
            Response::Ok => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn create_service(&mut self, name: &str, on_demand: bool) -> Result<u64, ClientError> {
        let request = Request::CreateService { name: name.to_string(), on_demand };
        match self.send(&request).await? {
            Response::Port { name } => Ok(name),
            other => Self::reject(other),
        }
    }

    pub async fn check_in(&mut self, name: &str) -> Result<u64, ClientError> {
        let request = Request::CheckIn { name: name.to_string() };
        match self.send(&request).await? {
            Response::Port { name } => Ok(name),
            other => Self::reject(other),
        }
    }

    pub async fn register(&mut self, name: &str, unregister: bool) -> Result<Option<u64>, ClientError> {
        let request = Request::Register { name: name.to_string(), unregister };
        match self.send(&request).await? {
            Response::Port { name } => Ok(Some(name)),
            Response::Ok => Ok(None),
            other => Self::reject(other),
        }
    }

    pub async fn look_up(&mut self, name: &str) -> Result<u64, ClientError> {
        let request = Request::LookUp { name: name.to_string() };
        match self.send(&request).await? {
            Response::Port { name } => Ok(name),
            other => Self::reject(other),
        }
    }

    pub async fn look_up_array(
        &mut self,
        names: Vec<String>,
    ) -> Result<Vec<bsd_wire::LookupArrayResult>, ClientError> {
        let request = Request::LookUpArray { names };
        match self.send(&request).await? {
            Response::LookUpArray { results } => Ok(results),
            other => Self::reject(other),
        }
    }

    pub async fn status(&mut self, name: &str) -> Result<bsd_wire::ServiceStatus, ClientError> {
        let request = Request::Status { name: name.to_string() };
        match self.send(&request).await? {
            Response::Status { status } => Ok(status),
            other => Self::reject(other),
        }
    }

    /// Request a subset. The returned job id is scoped to this connection:
    /// the subset tears itself down when this `DaemonClient` (and the
    /// connection it owns) is dropped.
    pub async fn subset(&mut self) -> Result<String, ClientError> {
        match self.send(&Request::Subset).await? {
            Response::Job { job } => Ok(job),
            other => Self::reject(other),
        }
    }

    pub async fn parent(&mut self) -> Result<String, ClientError> {
        match self.send(&Request::Parent).await? {
            Response::Job { job } => Ok(job),
            other => Self::reject(other),
        }
    }

    pub async fn unprivileged(&mut self) -> Result<u64, ClientError> {
        match self.send(&Request::Unprivileged).await? {
            Response::Port { name } => Ok(name),
            other => Self::reject(other),
        }
    }

    pub async fn info(&mut self) -> Result<JobInfoView, ClientError> {
        match self.send(&Request::Info).await? {
            Response::Info { names, programs, statuses } => Ok(JobInfoView { names, programs, statuses }),
            other => Self::reject(other),
        }
    }
}

/// Wire-level mirror of [`bsd_core::JobInfo`]: the service names, their
/// owning program names, and their activity statuses, aggregated by walking
/// from the connected job up through every ancestor. All three are parallel.
pub struct JobInfoView {
    pub names: Vec<String>,
    pub programs: Vec<String>,
    pub statuses: Vec<bsd_wire::ServiceStatus>,
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
