// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notifier client: request/reply over a single persistent TCP connection.
//!
//! Message ids are allocated monotonically per connection and recycled only
//! on reconnect. One `GET_ID` request may stay in flight across idle waits;
//! after a reconnect it is reissued for the same target id and any reply
//! belonging to the previous connection is discarded. Protocol desync
//! (mismatched id from the future, malformed frame) closes the connection,
//! retries once, then escalates; plain I/O errors reconnect under the
//! backoff policy for as long as the attempt budget allows.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{info, warn};

use shadow_wire::{read_line, write_line, Command, NextChange, ProtocolError, Reply, Request};

use crate::retry::{with_retry, Outcome};

/// Errors surfaced to the dispatcher. Transient conditions are handled
/// inside the client; what comes out is fatal to the pipeline.
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("notifier unreachable after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("notifier protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Streaming interface the dispatcher drives.
#[async_trait]
pub trait NotifierAdapter: Send {
    /// Wait up to `wait` for the transaction with id `expected`.
    /// `Ok(None)` is a timeout: nothing announced yet, ask again later.
    async fn get_next_id(
        &mut self,
        expected: u64,
        wait: Duration,
    ) -> Result<Option<NextChange>, NotifierError>;

    /// Keepalive probe; `false` means the notifier considers us gone.
    async fn alive(&mut self) -> Result<bool, NotifierError>;

    /// Current authoritative schema generation.
    async fn get_schema_id(&mut self) -> Result<u64, NotifierError>;

    /// Tear down the connection; the next call reconnects.
    async fn disconnect(&mut self);
}

/// Connection settings for [`TcpNotifier`].
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub addr: String,
    /// Reconnect attempt budget; 0 = unlimited.
    pub max_attempts: u32,
    /// How long to wait for `ALIVE` / `GET_SCHEMA_ID` replies.
    pub reply_timeout: Duration,
}

impl NotifierConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into(), max_attempts: 0, reply_timeout: Duration::from_secs(300) }
    }
}

struct Conn {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_msg_id: u32,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    msg_id: u32,
    expected: u64,
}

/// The production notifier client.
pub struct TcpNotifier {
    config: NotifierConfig,
    conn: Option<Conn>,
    /// In-flight `GET_ID`, kept across idle timeouts so the request is not
    /// resent while the server still owes us the answer.
    pending: Option<Pending>,
    /// A `GET_ID` reply that arrived while some other exchange was waiting.
    stashed: Option<NextChange>,
}

impl TcpNotifier {
    pub fn new(config: NotifierConfig) -> Self {
        Self { config, conn: None, pending: None, stashed: None }
    }

    async fn ensure_connected(&mut self) -> Result<(), NotifierError> {
        if self.conn.is_some() {
            return Ok(());
        }
        let addr = self.config.addr.clone();
        let stream = with_retry("notifier connect", self.config.max_attempts, || {
            let addr = addr.clone();
            async move {
                match TcpStream::connect(&addr).await {
                    Ok(stream) => Outcome::Done(stream),
                    Err(e) => Outcome::Transient(e),
                }
            }
        })
        .await
        .map_err(|e| NotifierError::Exhausted {
            attempts: self.config.max_attempts,
            last: e.to_string(),
        })?;
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        info!(addr = %self.config.addr, "connected to notifier");
        self.conn =
            Some(Conn { reader: BufReader::new(read_half), writer: write_half, next_msg_id: 0 });
        // Anything in flight belonged to the previous connection.
        self.pending = None;
        self.stashed = None;
        Ok(())
    }

    fn drop_conn(&mut self) {
        self.conn = None;
        self.pending = None;
        self.stashed = None;
    }

    async fn try_get_next(
        &mut self,
        expected: u64,
        wait: Duration,
    ) -> Result<Option<NextChange>, ProtocolError> {
        if !self.pending.is_some_and(|p| p.expected == expected) {
            let conn = self.conn.as_mut().ok_or(ProtocolError::ConnectionClosed)?;
            let msg_id = conn.next_msg_id;
            conn.next_msg_id += 1;
            let line = Request::new(msg_id, Command::GetId(expected)).encode();
            write_line(&mut conn.writer, &line).await?;
            self.pending = Some(Pending { msg_id, expected });
        }
        let Some(Pending { msg_id, .. }) = self.pending else {
            return Err(ProtocolError::ConnectionClosed);
        };
        let conn = self.conn.as_mut().ok_or(ProtocolError::ConnectionClosed)?;
        match tokio::time::timeout(wait, read_reply_matching(conn, msg_id)).await {
            // Timeout is not an error: the request stays pending.
            Err(_elapsed) => Ok(None),
            Ok(Ok(reply)) => {
                self.pending = None;
                Ok(Some(reply.into_next_change()?))
            }
            Ok(Err(e)) => Err(e),
        }
    }

    /// One-shot request/reply (`ALIVE`, `GET_SCHEMA_ID`). A `GET_ID` reply
    /// arriving in between is stashed, not dropped.
    async fn simple_call(&mut self, command: Command) -> Result<Reply, NotifierError> {
        let mut protocol_retried = false;
        loop {
            self.ensure_connected().await?;
            let Some(conn) = self.conn.as_mut() else {
                return Err(NotifierError::Protocol(ProtocolError::ConnectionClosed));
            };
            match exchange(
                conn,
                &mut self.pending,
                &mut self.stashed,
                command,
                self.config.reply_timeout,
            )
            .await
            {
                Ok(reply) => return Ok(reply),
                Err(e) if is_transient(&e) => {
                    warn!(error = %e, "notifier connection lost, reconnecting");
                    self.drop_conn();
                }
                Err(e) => {
                    if protocol_retried {
                        return Err(NotifierError::Protocol(e));
                    }
                    warn!(error = %e, "notifier protocol desync, retrying once");
                    protocol_retried = true;
                    self.drop_conn();
                }
            }
        }
    }
}

#[async_trait]
impl NotifierAdapter for TcpNotifier {
    async fn get_next_id(
        &mut self,
        expected: u64,
        wait: Duration,
    ) -> Result<Option<NextChange>, NotifierError> {
        if let Some(stashed) = self.stashed.take() {
            if stashed.id == expected {
                return Ok(Some(stashed));
            }
        }
        let mut protocol_retried = false;
        loop {
            self.ensure_connected().await?;
            match self.try_get_next(expected, wait).await {
                Ok(change) => return Ok(change),
                Err(e) if is_transient(&e) => {
                    warn!(error = %e, "notifier connection lost, reconnecting");
                    self.drop_conn();
                }
                Err(e) => {
                    if protocol_retried {
                        return Err(NotifierError::Protocol(e));
                    }
                    warn!(error = %e, "notifier protocol desync, retrying once");
                    protocol_retried = true;
                    self.drop_conn();
                }
            }
        }
    }

    async fn alive(&mut self) -> Result<bool, NotifierError> {
        let reply = self.simple_call(Command::Alive).await?;
        reply.into_alive().map_err(NotifierError::Protocol)
    }

    async fn get_schema_id(&mut self) -> Result<u64, NotifierError> {
        let reply = self.simple_call(Command::GetSchemaId).await?;
        reply.into_schema_id().map_err(NotifierError::Protocol)
    }

    async fn disconnect(&mut self) {
        self.drop_conn();
    }
}

fn is_transient(e: &ProtocolError) -> bool {
    matches!(e, ProtocolError::Io(_) | ProtocolError::ConnectionClosed)
}

/// Read until the reply for `want` arrives. Lower ids are stragglers and are
/// dropped with a warning; an id we have not issued yet means the stream is
/// desynced.
async fn read_reply_matching(conn: &mut Conn, want: u32) -> Result<Reply, ProtocolError> {
    loop {
        let line = read_line(&mut conn.reader).await?;
        let reply = Reply::parse(&line)?;
        if reply.msg_id == want {
            return Ok(reply);
        }
        if reply.msg_id > want {
            return Err(ProtocolError::BadMessageId(reply.msg_id.to_string()));
        }
        warn!(got = reply.msg_id, want, "dropping reply with unmatched message id");
    }
}

async fn exchange(
    conn: &mut Conn,
    pending: &mut Option<Pending>,
    stashed: &mut Option<NextChange>,
    command: Command,
    reply_timeout: Duration,
) -> Result<Reply, ProtocolError> {
    let msg_id = conn.next_msg_id;
    conn.next_msg_id += 1;
    write_line(&mut conn.writer, &Request::new(msg_id, command).encode()).await?;
    loop {
        let line = match tokio::time::timeout(reply_timeout, read_line(&mut conn.reader)).await {
            Ok(result) => result?,
            Err(_elapsed) => {
                return Err(ProtocolError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "timed out waiting for notifier reply",
                )));
            }
        };
        let reply = Reply::parse(&line)?;
        if reply.msg_id == msg_id {
            return Ok(reply);
        }
        if reply.msg_id > msg_id {
            return Err(ProtocolError::BadMessageId(reply.msg_id.to_string()));
        }
        if let Some(p) = *pending {
            if reply.msg_id == p.msg_id {
                *stashed = Some(reply.into_next_change()?);
                *pending = None;
                continue;
            }
        }
        warn!(got = reply.msg_id, want = msg_id, "dropping reply with unmatched message id");
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeState {
        changes: VecDeque<NextChange>,
        alive_replies: VecDeque<bool>,
        schema_id: u64,
        get_next_calls: Vec<u64>,
        alive_calls: u32,
        schema_calls: u32,
        disconnects: u32,
    }

    /// Scripted in-memory notifier for engine tests. Clones share state so
    /// tests keep a handle while the runtime owns another.
    #[derive(Clone, Default)]
    pub struct FakeNotifier {
        inner: Arc<Mutex<FakeState>>,
    }

    impl FakeNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a `GET_ID` announcement; once drained, `get_next_id`
        /// reports timeouts.
        pub fn push_change(&self, change: NextChange) {
            self.inner.lock().changes.push_back(change);
        }

        /// Queue an `ALIVE` reply; once drained, `alive` returns `true`.
        pub fn push_alive(&self, ok: bool) {
            self.inner.lock().alive_replies.push_back(ok);
        }

        pub fn set_schema_id(&self, id: u64) {
            self.inner.lock().schema_id = id;
        }

        pub fn get_next_calls(&self) -> Vec<u64> {
            self.inner.lock().get_next_calls.clone()
        }

        pub fn alive_calls(&self) -> u32 {
            self.inner.lock().alive_calls
        }

        pub fn schema_calls(&self) -> u32 {
            self.inner.lock().schema_calls
        }

        pub fn disconnects(&self) -> u32 {
            self.inner.lock().disconnects
        }
    }

    #[async_trait]
    impl NotifierAdapter for FakeNotifier {
        async fn get_next_id(
            &mut self,
            expected: u64,
            _wait: Duration,
        ) -> Result<Option<NextChange>, NotifierError> {
            let mut state = self.inner.lock();
            state.get_next_calls.push(expected);
            Ok(state.changes.pop_front())
        }

        async fn alive(&mut self) -> Result<bool, NotifierError> {
            let mut state = self.inner.lock();
            state.alive_calls += 1;
            Ok(state.alive_replies.pop_front().unwrap_or(true))
        }

        async fn get_schema_id(&mut self) -> Result<u64, NotifierError> {
            let mut state = self.inner.lock();
            state.schema_calls += 1;
            Ok(state.schema_id)
        }

        async fn disconnect(&mut self) {
            self.inner.lock().disconnects += 1;
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeNotifier;

#[cfg(test)]
#[path = "notifier_tests.rs"]
mod tests;
