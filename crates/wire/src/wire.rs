// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line framing over async streams.

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single protocol line. A DN plus framing never comes
/// close; anything larger is a desynced or hostile peer.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Errors in protocol framing or payload interpretation.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("truncated frame (missing newline)")]
    Truncated,

    #[error("line exceeds {MAX_LINE_BYTES} bytes")]
    LineTooLong,

    #[error("reply has no message id")]
    MissingMessageId,

    #[error("bad message id: {0:?}")]
    BadMessageId(String),

    #[error("bad numeric field: {0:?}")]
    BadNumber(String),

    #[error("unknown change command: {0:?}")]
    UnknownCommand(String),

    #[error("unexpected reply shape: expected {expected}, got {got} fields")]
    UnexpectedShape { expected: &'static str, got: usize },

    #[error("unexpected alive status: {0:?}")]
    BadAliveStatus(String),
}

/// Write one message line, newline-terminated, and flush.
pub async fn write_line<W>(writer: &mut W, line: &str) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Read one message line. A clean EOF maps to [`ProtocolError::ConnectionClosed`];
/// EOF mid-line is a truncated frame.
pub async fn read_line<R>(reader: &mut R) -> Result<String, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(ProtocolError::ConnectionClosed);
    }
    if !line.ends_with('\n') {
        return Err(ProtocolError::Truncated);
    }
    line.pop();
    if line.ends_with('\r') {
        line.pop();
    }
    if line.len() > MAX_LINE_BYTES {
        return Err(ProtocolError::LineTooLong);
    }
    Ok(line)
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
