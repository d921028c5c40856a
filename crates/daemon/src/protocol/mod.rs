// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol for `bsdd`.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload, in both
//! directions.

use std::time::Duration;

use bsd_wire::{Request, Response};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Refuse to allocate a body buffer larger than this many bytes.
const MAX_MESSAGE_BYTES: u32 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed")]
    ConnectionClosed,
    #[error("timed out waiting for peer")]
    Timeout,
    #[error("message of {0} bytes exceeds the {MAX_MESSAGE_BYTES}-byte limit")]
    TooLarge(u32),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub async fn read_request<R>(reader: &mut R, timeout: Duration) -> Result<Request, ProtocolError>
where
    R: AsyncRead + AsyncReadExt + Unpin,
{
    let body = read_message(reader, timeout).await?;
    Ok(serde_json::from_slice(&body)?)
}

pub async fn write_response<W>(
    writer: &mut W,
    response: &Response,
    timeout: Duration,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + AsyncWriteExt + Unpin,
{
    let body = serde_json::to_vec(response)?;
    write_message(writer, &body, timeout).await
}

/// Used by the startup-time ancestor registration client, which speaks the
/// same framing as an ordinary connection but in the client role.
pub async fn write_request<W>(
    writer: &mut W,
    request: &Request,
    timeout: Duration,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + AsyncWriteExt + Unpin,
{
    let body = serde_json::to_vec(request)?;
    write_message(writer, &body, timeout).await
}

pub async fn read_response<R>(reader: &mut R, timeout: Duration) -> Result<Response, ProtocolError>
where
    R: AsyncRead + AsyncReadExt + Unpin,
{
    let body = read_message(reader, timeout).await?;
    Ok(serde_json::from_slice(&body)?)
}

async fn read_message<R>(reader: &mut R, timeout: Duration) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + AsyncReadExt + Unpin,
{
    let mut len_buf = [0u8; 4];
    read_exact_timed(reader, &mut len_buf, timeout).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_BYTES {
        return Err(ProtocolError::TooLarge(len));
    }
    let mut body = vec![0u8; len as usize];
    read_exact_timed(reader, &mut body, timeout).await?;
    Ok(body)
}

async fn read_exact_timed<R>(
    reader: &mut R,
    buf: &mut [u8],
    timeout: Duration,
) -> Result<(), ProtocolError>
where
    R: AsyncRead + AsyncReadExt + Unpin,
{
    match tokio::time::timeout(timeout, reader.read_exact(buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(ProtocolError::ConnectionClosed)
        }
        Ok(Err(e)) => Err(ProtocolError::Io(e)),
        Err(_) => Err(ProtocolError::Timeout),
    }
}

async fn write_message<W>(
    writer: &mut W,
    body: &[u8],
    timeout: Duration,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + AsyncWriteExt + Unpin,
{
    let len = u32::try_from(body.len()).map_err(|_| ProtocolError::TooLarge(u32::MAX))?;
    tokio::time::timeout(timeout, async {
        writer.write_all(&len.to_be_bytes()).await?;
        writer.write_all(body).await?;
        writer.flush().await
    })
    .await
    .map_err(|_| ProtocolError::Timeout)??;
    Ok(())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
