//! Connection Handler Module
//!
//! This module handles individual client connections to dispatchd.
//! Each client gets its own handler task that runs in a loop,
//! reading lines and sending responses.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned, optional greeting queued
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Frame buffered lines    │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Dispatch each command   │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Flush the write queue   │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read bytes from socket  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. QUIT / client disconnects / idle timeout / error
//!        │
//!        ▼
//! 5. Handler task ends
//! ```
//!
//! ## Buffer Management
//!
//! We use a BytesMut buffer to accumulate incoming data. TCP is a stream
//! protocol, so a read may hold half a line or several lines. The line parser
//! caps how much of a single line is ever buffered.

use crate::commands::DispatchTable;
use crate::connection::Session;
use crate::protocol::{Frame, LineParser, DEFAULT_MAX_LINE_LENGTH};
use bytes::{Buf, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Default idle timeout, matching a five minute session lifetime
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// How long a closing connection keeps reading input the client already sent
const CLOSE_LINGER: Duration = Duration::from_millis(250);

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Commands answered with an error response
    pub commands_failed: AtomicU64,
    /// Lines rejected by the parser
    pub protocol_errors: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self, succeeded: bool) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.commands_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Per-connection limits and behaviour, shared by every connection.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Longest accepted request line in bytes
    pub max_line_length: usize,
    /// Close the connection after this long without input; `None` disables
    pub idle_timeout: Option<Duration>,
    /// Line sent to every client right after it connects
    pub greeting: Option<String>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            greeting: None,
        }
    }
}

/// Handles a single client connection.
///
/// This struct manages the read buffer, parsing, and response sending
/// for one connected client. It is generic over the stream so it can run on
/// a `TcpStream` or on any other duplex byte stream.
pub struct ConnectionHandler<S> {
    /// The stream for this connection
    stream: BufWriter<S>,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// Line parser
    parser: LineParser,

    /// The dispatch table (shared across connections)
    dispatch: Arc<DispatchTable>,

    /// Context handed to command handlers
    session: Session,

    /// Connection limits
    options: ConnectionOptions,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The byte stream for this connection
    /// * `session` - The session describing this client
    /// * `dispatch` - The dispatch table for executing commands
    /// * `options` - Line length, idle timeout and greeting
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: S,
        session: Session,
        dispatch: Arc<DispatchTable>,
        options: ConnectionOptions,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: LineParser::new(options.max_line_length),
            dispatch,
            session,
            options,
            stats,
        }
    }

    /// Runs the main connection loop.
    ///
    /// This method reads commands from the client, executes them,
    /// and sends back responses until the client disconnects, quits,
    /// goes idle, or an error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        let client = self.session.peer_addr();
        let session = self.session.id();
        info!(client = %client, session, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %client, session, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(client = %client, session, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %client, session, "Connection reset by client")
                }
                ConnectionError::IdleTimeout(limit) => {
                    info!(client = %client, session, idle_secs = limit.as_secs(), "Closing idle connection")
                }
                _ => warn!(client = %client, session, error = %e, "Connection error"),
            },
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        if let Some(greeting) = self.options.greeting.clone() {
            self.session.send_response(greeting);
            self.flush_responses().await?;
        }

        loop {
            // Dispatch every complete line already buffered
            while let Some(frame) = self.next_frame() {
                if let Frame::Command(command) = frame {
                    trace!(session = self.session.id(), command = %command, "Dispatching");
                    let succeeded = self.dispatch.execute(&mut self.session, &command);
                    self.stats.command_processed(succeeded);

                    if self.session.is_closing() {
                        break;
                    }
                }
            }

            self.flush_responses().await?;

            if self.session.is_closing() {
                self.shutdown_gracefully().await;
                return Ok(());
            }

            // Need more data - read from the socket
            self.read_more_data().await?;
        }
    }

    /// Takes the next frame off the buffer.
    ///
    /// Parser errors are answered on the session and reported as an empty
    /// frame; the parser then skips the rest of the offending line.
    fn next_frame(&mut self) -> Option<Frame> {
        match self.parser.parse(&self.buffer) {
            Ok(Some((frame, consumed))) => {
                self.buffer.advance(consumed);
                trace!(
                    session = self.session.id(),
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Framed line"
                );
                Some(frame)
            }
            Ok(None) => {
                // Incomplete data - need to read more
                trace!(
                    session = self.session.id(),
                    buffered = self.buffer.len(),
                    "Incomplete line, need more data"
                );
                None
            }
            Err(e) => {
                debug!(
                    session = self.session.id(),
                    max_line_length = self.parser.max_line_length(),
                    error = %e,
                    "Rejected line"
                );
                self.stats.protocol_error();
                self.session.send_error(e.client_message());
                Some(Frame::Empty)
            }
        }
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        // Ensure we have some capacity
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let read = self.stream.get_mut().read_buf(&mut self.buffer);
        let n = match self.options.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| ConnectionError::IdleTimeout(limit))??,
            None => read.await?,
        };

        if n == 0 {
            // Connection closed by client
            if self.buffer.is_empty() || self.parser.is_discarding() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                // Unterminated line in buffer
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(session = self.session.id(), bytes = n, "Read data");

        Ok(())
    }

    /// Half-closes the stream, then discards input for up to `CLOSE_LINGER`.
    ///
    /// Unread input left in the socket when it is dropped turns the close into
    /// a reset, which can cost the client its last responses.
    async fn shutdown_gracefully(&mut self) {
        let session = self.session.id();
        if let Err(e) = self.stream.shutdown().await {
            debug!(session, error = %e, "Shutdown failed");
            return;
        }

        let stream = self.stream.get_mut();
        let mut scratch = [0u8; 1024];
        let drain = async {
            loop {
                match stream.read(&mut scratch).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => trace!(session, bytes = n, "Discarded input after close"),
                }
            }
        };
        if tokio::time::timeout(CLOSE_LINGER, drain).await.is_err() {
            trace!(session, "Client still sending at close");
        }
    }

    /// Drains the session's write queue onto the stream.
    async fn flush_responses(&mut self) -> Result<(), ConnectionError> {
        let mut written = 0;
        while let Some(bytes) = self.session.pop_pending() {
            self.stream.write_all(&bytes).await?;
            written += bytes.len();
        }

        if written > 0 {
            self.stream.flush().await?;
            self.stats.bytes_written(written);
            trace!(
                session = self.session.id(),
                bytes = written,
                "Sent responses"
            );
        }
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial line)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// No input arrived within the idle timeout
    #[error("Idle for more than {0:?}")]
    IdleTimeout(Duration),
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion.
///
/// # Arguments
///
/// * `stream` - The byte stream for this connection
/// * `session` - The session describing this client
/// * `dispatch` - The dispatch table for executing commands
/// * `options` - Line length, idle timeout and greeting
/// * `stats` - Shared connection statistics
pub async fn handle_connection<S>(
    stream: S,
    session: Session,
    dispatch: Arc<DispatchTable>,
    options: ConnectionOptions,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let client = session.peer_addr();
    let handler = ConnectionHandler::new(stream, session, dispatch, options, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %client, error = %e, "Connection ended with error");
            }
        }
    }
}
