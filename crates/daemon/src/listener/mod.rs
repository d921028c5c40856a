// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for handling socket I/O.
//!
//! Every accepted connection is dispatched to the one [`Daemon`] the daemon
//! process owns; `Subset` is the one connection-upgrading request — its
//! reply hands back the new job, and the connection is then held open
//! purely to detect the requestor's disconnect, which is this transport's
//! stand-in for a dead-name notification (see `bsd_core::Daemon::subset`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use bsd_core::{BootstrapError, Caller, Daemon, JobId, SendRight, ServerSpec};
use bsd_wire::{LookupArrayResult, Request, Response, StatusCode};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::env::{self, ipc_timeout};
use crate::protocol::{self, read_request, read_response, write_request, write_response};

/// Shared daemon context handed to every accepted connection.
pub struct ListenCtx {
    pub daemon: Arc<Mutex<Daemon>>,
    pub state_dir: PathBuf,
    pub start_time: Instant,
    /// Socket of an inherited ancestor bootstrap context, when this daemon
    /// registered itself as one of its subsets at startup. Lookups this
    /// namespace can't resolve are forwarded here.
    pub upstream_socket: Option<PathBuf>,
    /// Send rights handed out over the wire. Held for the life of the
    /// daemon: without real fd-passing there is no signal for a remote
    /// client dropping its copy of a port name, so firing `NoSenders` for a
    /// wire-originated right would be fiction. In-process holders (this
    /// crate's own tests, `bsd-core`'s test suite) are unaffected since they
    /// hold the `SendRight` directly. See DESIGN.md.
    outstanding: Mutex<Vec<SendRight>>,
}

impl ListenCtx {
    pub fn new(daemon: Arc<Mutex<Daemon>>, state_dir: PathBuf, upstream_socket: Option<PathBuf>) -> Self {
        Self { daemon, state_dir, start_time: Instant::now(), upstream_socket, outstanding: Mutex::new(Vec::new()) }
    }

    fn subset_socket_path(&self, job: JobId) -> PathBuf {
        self.state_dir.join("subsets").join(format!("{job}.sock"))
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Listener task for accepting connections on one socket, attributing every
/// connection it accepts to a fixed [`Caller`].
///
/// The daemon's own socket always attributes connections to the root job's
/// privileged port (a local Unix socket is inherently trusted, same as the
/// teacher's `ConnectionSource::Unix` path); a subset's socket (bound
/// dynamically by [`handle_subset`]) attributes connections to that
/// subset's job instead.
pub struct Listener {
    unix: UnixListener,
    ctx: Arc<ListenCtx>,
    caller: Caller,
}

impl Listener {
    pub fn new(unix: UnixListener, ctx: Arc<ListenCtx>, caller: Caller) -> Self {
        Self { unix, ctx, caller }
    }

    pub async fn run(self) {
        run_accept_loop(self.unix, self.ctx, self.caller, None).await;
    }
}

async fn run_accept_loop(
    listener: UnixListener,
    ctx: Arc<ListenCtx>,
    caller: Caller,
    stop: Option<CancellationToken>,
) {
    loop {
        let accepted = match &stop {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => break,
                    accepted = listener.accept() => accepted,
                }
            }
            None => listener.accept().await,
        };
        match accepted {
            Ok((stream, _)) => {
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, caller, ctx).await {
                        log_connection_error(e);
                    }
                });
            }
            Err(e) => error!(error = %e, "accept error"),
        }
    }
}

fn log_connection_error(e: ConnectionError) {
    match e {
        ConnectionError::Protocol(protocol::ProtocolError::ConnectionClosed) => debug!("client disconnected"),
        ConnectionError::Protocol(protocol::ProtocolError::Timeout) => warn!("connection timeout"),
        other => error!(error = %other, "connection error"),
    }
}

/// Resolve the connecting peer's effective UID from the accepted Unix
/// socket's credentials (`SO_PEERCRED` on Linux). Falls back to an
/// unprivileged sentinel if the platform or socket doesn't support it, which
/// only ever makes a caller *less* privileged, never more.
fn peer_uid(stream: &UnixStream) -> u32 {
    stream.peer_cred().map(|cred| cred.uid()).unwrap_or(u32::MAX)
}

async fn handle_connection(mut stream: UnixStream, caller: Caller, ctx: Arc<ListenCtx>) -> Result<(), ConnectionError> {
    let caller = Caller { uid: peer_uid(&stream), ..caller };
    let request = read_request(&mut stream, ipc_timeout()).await?;

    if matches!(request, Request::Subset) {
        return handle_subset(stream, caller, ctx).await;
    }

    debug!(request = ?request, "received request");
    let response = handle_request(request, caller, &ctx).await;
    write_response(&mut stream, &response, ipc_timeout()).await?;
    Ok(())
}

/// `Subset` upgrades the connection: the reply carries the new job, a fresh
/// socket is bound for it, and this connection is kept open afterward purely
/// to watch for the requestor hanging up.
async fn handle_subset(mut stream: UnixStream, caller: Caller, ctx: Arc<ListenCtx>) -> Result<(), ConnectionError> {
    let token = CancellationToken::new();
    let created = ctx.daemon.lock().subset(caller, token.clone());
    let job = match created {
        Ok(job) => job,
        Err(err) => {
            write_response(&mut stream, &error_response(err), ipc_timeout()).await?;
            return Ok(());
        }
    };

    let socket_path = ctx.subset_socket_path(job);
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let subset_listener = UnixListener::bind(&socket_path)?;
    // uid is a placeholder here: every connection accepted on this subset's
    // socket gets its own peer-credential uid resolved in `handle_connection`.
    let subset_caller = Caller { job, privileged: true, uid: 0 };
    let accept_ctx = Arc::clone(&ctx);
    let accept_token = token.clone();
    tokio::spawn(async move {
        run_accept_loop(subset_listener, accept_ctx, subset_caller, Some(accept_token)).await;
        let _ = std::fs::remove_file(&socket_path);
        debug!(job = %job, "subset listener stopped");
    });

    write_response(&mut stream, &Response::Job { job: job.to_string() }, ipc_timeout()).await?;
    info!(parent = %caller.job, child = %job, "subset ready");

    // The requestor's liveness *is* this connection staying open. EOF (or
    // any read error) means it went away.
    let mut buf = [0u8; 1];
    let _ = stream.read(&mut buf).await;
    token.cancel();
    info!(job = %job, "subset requestor disconnected");
    Ok(())
}

async fn handle_request(request: Request, caller: Caller, ctx: &ListenCtx) -> Response {
    match request {
        Request::Hello { version: _ } => Response::Hello { version: env::PROTOCOL_VERSION.to_string() },
        Request::Ping => Response::Pong,

        Request::CreateServer { command, argv0, uid, on_demand } => {
            let spec = ServerSpec { command, argv0, uid, on_demand };
            match ctx.daemon.lock().create_server(caller, spec) {
                Ok(()) => Response::Ok,
                Err(err) => error_response(err),
            }
        }

        Request::CreateService { name, on_demand } => match ctx.daemon.lock().create_service(caller, &name, on_demand) {
            Ok(port) => Response::Port { name: port.0 },
            Err(err) => error_response(err),
        },

        Request::CheckIn { name } => match ctx.daemon.lock().check_in(caller, &name) {
            Ok(port) => Response::Port { name: port.0 },
            Err(err) => error_response(err),
        },

        Request::Register { name, unregister } => match ctx.daemon.lock().register(caller, &name, unregister) {
            Ok(Some(port)) => Response::Port { name: port.0 },
            Ok(None) => Response::Ok,
            Err(err) => error_response(err),
        },

        Request::LookUp { name } => look_up_with_upstream_fallback(&name, caller, ctx).await,

        Request::LookUpArray { names } => {
            if names.len() > bsd_wire::MAX_LOOKUP_ARRAY {
                return error_response(BootstrapError::BadCount);
            }
            let entries = ctx.daemon.lock().look_up_array(caller, &names);
            let results = entries
                .into_iter()
                .map(|entry| match entry.result {
                    Ok(port) => LookupArrayResult { name: entry.name, port: Some(port.0), status: StatusCode::SUCCESS },
                    Err(err) => LookupArrayResult { name: entry.name, port: None, status: err.into() },
                })
                .collect();
            Response::LookUpArray { results }
        }

        Request::Status { name } => match ctx.daemon.lock().status(caller, &name) {
            Ok(value) => Response::Status { status: value.into() },
            Err(err) => error_response(err),
        },

        Request::Subset => unreachable!("intercepted in handle_connection before dispatch"),

        Request::Parent => match ctx.daemon.lock().parent(caller) {
            Ok(job) => Response::Job { job: job.to_string() },
            Err(err) => error_response(err),
        },

        Request::Unprivileged => {
            let result = ctx.daemon.lock().unprivileged(caller);
            match result {
                Ok(send) => {
                    let name = send.name();
                    ctx.outstanding.lock().push(send);
                    Response::Port { name: name.0 }
                }
                Err(err) => error_response(err),
            }
        }

        Request::Info => match ctx.daemon.lock().info(caller) {
            Ok(info) => Response::Info {
                names: info.names,
                programs: info.programs,
                statuses: info.statuses.into_iter().map(Into::into).collect(),
            },
            Err(err) => error_response(err),
        },
    }
}

fn error_response(err: BootstrapError) -> Response {
    Response::Error { status: err.into() }
}

/// `look_up` against the local namespace, falling back to the inherited
/// ancestor (if any) exactly once on `UnknownService` — spec.md §4.3's
/// "forwarded to upstream verbatim" rule.
async fn look_up_with_upstream_fallback(name: &str, caller: Caller, ctx: &ListenCtx) -> Response {
    let local = ctx.daemon.lock().look_up(caller, name);
    match local {
        Ok(send) => {
            let port_name = send.name();
            ctx.outstanding.lock().push(send);
            Response::Port { name: port_name.0 }
        }
        Err(BootstrapError::UnknownService) => match &ctx.upstream_socket {
            Some(upstream) => match forward_look_up(upstream, name).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "upstream forward failed");
                    error_response(BootstrapError::UnknownService)
                }
            },
            None => error_response(BootstrapError::UnknownService),
        },
        Err(err) => error_response(err),
    }
}

async fn forward_look_up(upstream: &std::path::Path, name: &str) -> Result<Response, ConnectionError> {
    let mut stream = UnixStream::connect(upstream).await?;
    write_request(&mut stream, &Request::LookUp { name: name.to_string() }, ipc_timeout()).await?;
    Ok(read_response(&mut stream, ipc_timeout()).await?)
}

#[cfg(test)]
#[path = "../listener_tests.rs"]
mod tests;
