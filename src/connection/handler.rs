//! Connection Session Loop
//!
//! Each client connection is driven by its own task running this loop,
//! reading frames and writing one reply per request until the client goes
//! away.
//!
//! ## Session States
//!
//! ```text
//!            accept
//!              │
//!              ▼
//!     ┌─────────────────┐  bytes, frame incomplete
//!  ┌─>│ AwaitingFrame   │──────────────┐
//!  │  └────────┬────────┘<─────────────┘
//!  │           │ frame complete
//!  │           ▼
//!  │  ┌─────────────────┐
//!  │  │  FrameReady     │  decode
//!  │  └────────┬────────┘
//!  │           ▼
//!  │  ┌─────────────────┐
//!  └──│  Dispatching    │  execute + write reply
//!     └─────────────────┘
//!
//!   AwaitingFrame ── EOF / I/O error / malformed frame ──> Closed
//! ```
//!
//! ## Buffer Management
//!
//! Incoming bytes land in a [`FrameReader`]. Every complete request in it
//! is executed in order before the socket is read again, so pipelined
//! requests each get their reply. Bytes of a request that is still
//! arriving stay buffered across reads.

use crate::commands::CommandHandler;
use crate::protocol::frame::DEFAULT_MAX_BUFFER;
use crate::protocol::{decode, FrameError, FrameReader, RespValue};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, trace, warn};

/// Server-wide counters, shared by every session through an `Arc`.
///
/// All updates are `Relaxed`; readers get a best-effort snapshot.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub connections_accepted: AtomicU64,
    /// Sessions opened and not yet closed
    pub active_connections: AtomicU64,
    /// Requests dispatched, one per reply sent
    pub commands_processed: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        Self::bump(&self.connections_accepted, 1);
        Self::bump(&self.active_connections, 1);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        Self::bump(&self.commands_processed, 1);
    }

    pub fn bytes_read(&self, count: usize) {
        Self::bump(&self.bytes_read, count as u64);
    }

    pub fn bytes_written(&self, count: usize) {
        Self::bump(&self.bytes_written, count as u64);
    }
}

/// Where a session currently is in its read-dispatch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingFrame,
    FrameReady,
    Dispatching,
    Closed,
}

/// Drives a single client connection.
///
/// Generic over the byte stream so anything duplex (a `TcpStream`, an
/// in-memory pipe, a test mock) can be served.
pub struct ConnectionHandler<S> {
    /// Replies queue here until the batch is flushed
    stream: BufWriter<S>,
    addr: SocketAddr,
    reader: FrameReader,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    state: SessionState,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an accepted stream and counts it as an open connection.
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            reader: FrameReader::new(DEFAULT_MAX_BUFFER),
            command_handler,
            stats,
            state: SessionState::AwaitingFrame,
        }
    }

    /// Caps how many unframed bytes this connection may buffer.
    pub fn with_max_buffer(mut self, max_buffer: usize) -> Self {
        self.reader = FrameReader::new(max_buffer);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the session until the client disconnects or an error occurs.
    ///
    /// Returns `Ok(())` when the client closes the stream between requests.
    /// The session ends in [`SessionState::Closed`]; the stream itself is
    /// closed, and the connection uncounted, when the handler is dropped.
    pub async fn run(&mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;
        self.state = SessionState::Closed;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            self.process_frames().await?;
            if !self.read_more_data().await? {
                return Ok(());
            }
        }
    }

    /// Executes every complete request in the buffer, in order.
    async fn process_frames(&mut self) -> Result<(), ConnectionError> {
        let mut replied = false;
        let result = self.dispatch_buffered(&mut replied).await;

        // Earlier pipelined replies still go out ahead of a malformed frame
        if replied {
            self.stream.flush().await?;
        }
        result
    }

    async fn dispatch_buffered(&mut self, replied: &mut bool) -> Result<(), ConnectionError> {
        while let Some(frame) = self.try_next_frame()? {
            self.state = SessionState::FrameReady;
            let command = decode(&frame)?;

            self.state = SessionState::Dispatching;
            let response = self.command_handler.execute(&command);
            self.stats.command_processed();
            self.write_response(&response).await?;
            *replied = true;

            self.state = SessionState::AwaitingFrame;
        }
        Ok(())
    }

    /// Splits the next request off the buffer, if one is complete.
    fn try_next_frame(&mut self) -> Result<Option<Bytes>, ConnectionError> {
        match self.reader.next_frame() {
            Ok(Some(frame)) => {
                trace!(
                    client = %self.addr,
                    consumed = frame.len(),
                    remaining = self.reader.len(),
                    "Framed request"
                );
                Ok(Some(frame))
            }
            Ok(None) => {
                trace!(
                    client = %self.addr,
                    buffered = self.reader.len(),
                    "Incomplete request, need more data"
                );
                Ok(None)
            }
            Err(e) if e.is_recoverable() => {
                // No reply is defined for non-array requests; drop what we have
                let dropped = self.reader.discard();
                warn!(client = %self.addr, error = %e, dropped, "Unsupported request type");
                Ok(None)
            }
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Malformed request");
                Err(ConnectionError::ParseError(e))
            }
        }
    }

    /// Reads more data from the stream into the buffer.
    ///
    /// Returns `false` on a clean end of stream.
    async fn read_more_data(&mut self) -> Result<bool, ConnectionError> {
        if self.reader.is_full() {
            error!(
                client = %self.addr,
                size = self.reader.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        let n = self
            .stream
            .get_mut()
            .read_buf(self.reader.buffer_mut())
            .await?;

        if n == 0 {
            return if self.reader.is_empty() {
                Ok(false)
            } else {
                // Partial request in buffer
                Err(ConnectionError::UnexpectedEof)
            };
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(true)
    }

    /// Queues a reply; it reaches the client on the next flush.
    async fn write_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            reply = %response,
            bytes = bytes.len(),
            "Queued response"
        );
        Ok(())
    }
}

// Runs on every exit, including a session task aborted at an `.await`.
impl<S> Drop for ConnectionHandler<S> {
    fn drop(&mut self) {
        self.stats.connection_closed();
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed request
    #[error("Parse error: {0}")]
    ParseError(#[from] FrameError),

    /// Unexpected end of stream (partial request)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Serves one client until its session ends.
///
/// A connection reset is an ordinary ending; anything else is logged at
/// debug, having already been reported by [`ConnectionHandler::run`].
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    max_buffer: usize,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut handler =
        ConnectionHandler::new(stream, addr, command_handler, stats).with_max_buffer(max_buffer);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}
