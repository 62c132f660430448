//! Connection worker
//!
//! Owns one client stream for its whole life: reads a line, decodes it,
//! dispatches it, writes exactly one reply, repeats. Requests on a connection
//! are answered strictly in order.
//!
//! Every failure short of a transport error is answered with an error
//! Response and the loop continues. End of stream, an I/O error, or the stop
//! signal close the connection. The stop signal is only observed while
//! waiting for the next line, so a reply in progress is always completed.

use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, trace, warn};

use crate::protocol::{self, Response, UNKNOWN_REQUEST_ID};
use crate::registry::CommandRegistry;
use crate::session::SessionStore;
use crate::shutdown::ShutdownSignal;
use crate::types::Result;

/// Reply text for frames that fail decoding or validation
pub const INVALID_MESSAGE: &str = "Invalid message";

/// Default cap on a single request line
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Shared, read-only state every worker needs
#[derive(Clone)]
pub struct ConnectionContext {
    pub registry: Arc<CommandRegistry>,
    pub sessions: Arc<SessionStore>,
    pub max_line_bytes: usize,
}

impl ConnectionContext {
    pub fn new(registry: Arc<CommandRegistry>, sessions: Arc<SessionStore>) -> Self {
        Self {
            registry,
            sessions,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Produce the reply for one raw request line
    pub async fn respond(&self, line: &str) -> Response {
        match protocol::decode(line) {
            Some(message) if protocol::is_valid(Some(&message)) => {
                self.registry.dispatch(&message, &self.sessions).await
            }
            Some(message) => Response::error(message.reply_id(), INVALID_MESSAGE),
            None => Response::error(protocol::recover_request_id(line), INVALID_MESSAGE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Reading,
    Dispatching,
    Writing,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connected => "connected",
            Self::Reading => "reading",
            Self::Dispatching => "dispatching",
            Self::Writing => "writing",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Why a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed its side
    EndOfStream,
    /// Listener asked workers to stop
    Shutdown,
    /// Read or write failed
    Transport,
}

/// Outcome of a served connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub requests: u64,
    pub reason: CloseReason,
}

enum Frame {
    Line,
    TooLong,
    Eof,
}

struct Connection<'a, R, W> {
    reader: BufReader<R>,
    writer: W,
    peer: &'a str,
    ctx: &'a ConnectionContext,
    state: ConnectionState,
    requests: u64,
}

impl<R, W> Connection<'_, R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    fn transition(&mut self, next: ConnectionState) {
        trace!(peer = self.peer, from = %self.state, to = %next, "Connection state");
        self.state = next;
    }

    /// Read up to the next `\n`, discarding the line if it exceeds the cap
    async fn read_frame(&mut self, buf: &mut Vec<u8>) -> std::io::Result<Frame> {
        buf.clear();
        let mut overflow = false;

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(match (overflow, buf.is_empty()) {
                    (true, _) => Frame::TooLong,
                    (false, true) => Frame::Eof,
                    (false, false) => Frame::Line,
                });
            }

            let (chunk_len, complete) = match available.iter().position(|b| *b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            };

            if !overflow {
                let data = if complete { &available[..chunk_len - 1] } else { available };
                buf.extend_from_slice(data);
                if buf.len() > self.ctx.max_line_bytes {
                    overflow = true;
                    buf.clear();
                }
            }
            self.reader.consume(chunk_len);

            if complete {
                return Ok(if overflow { Frame::TooLong } else { Frame::Line });
            }
        }
    }

    async fn write_response(&mut self, response: &Response) -> std::io::Result<()> {
        self.transition(ConnectionState::Writing);
        let line = protocol::encode(response);
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await
    }

    async fn run(&mut self, mut shutdown: ShutdownSignal) -> Result<CloseReason> {
        let mut buf = Vec::with_capacity(1024);

        loop {
            self.transition(ConnectionState::Reading);
            let frame = tokio::select! {
                frame = self.read_frame(&mut buf) => frame?,
                _ = shutdown.recv() => return Ok(CloseReason::Shutdown),
            };

            let response = match frame {
                Frame::Eof => return Ok(CloseReason::EndOfStream),
                Frame::TooLong => {
                    warn!(peer = self.peer, "Request line exceeds {} bytes", self.ctx.max_line_bytes);
                    Response::error(UNKNOWN_REQUEST_ID, "Message too large")
                }
                Frame::Line => match std::str::from_utf8(&buf) {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => {
                        self.transition(ConnectionState::Dispatching);
                        self.ctx.respond(line).await
                    }
                    Err(_) => Response::error(UNKNOWN_REQUEST_ID, INVALID_MESSAGE),
                },
            };

            self.requests += 1;
            self.write_response(&response).await?;
        }
    }
}

/// Serve one client stream until it closes
///
/// Returns how many requests were answered and why the loop ended. The
/// stream is dropped (and thereby closed) on every path.
pub async fn serve<S>(
    stream: S,
    peer: &str,
    ctx: &ConnectionContext,
    shutdown: ShutdownSignal,
) -> ConnectionSummary
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut conn = Connection {
        reader: BufReader::new(read_half),
        writer: write_half,
        peer,
        ctx,
        state: ConnectionState::Connected,
        requests: 0,
    };
    debug!(peer, "Connection opened");

    let reason = match conn.run(shutdown).await {
        Ok(reason) => reason,
        Err(e) => {
            debug!(peer, "Connection transport error: {}", e);
            CloseReason::Transport
        }
    };

    conn.transition(ConnectionState::Closing);
    let _ = conn.writer.shutdown().await;
    conn.transition(ConnectionState::Closed);
    debug!(peer, requests = conn.requests, ?reason, "Connection closed");

    ConnectionSummary {
        requests: conn.requests,
        reason,
    }
}
