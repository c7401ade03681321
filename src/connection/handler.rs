//! Connection State Machine
//!
//! This module owns one server connection: the transport, the decoder state,
//! the pending request queue and the pipeline buffer.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Disconnected
//!        │  first send() / exec()
//!        ▼
//! 2. Connecting ──── TransportEvent::Connected ───┐
//!        │                                        ▼
//!        │                                  3. Connected
//!        │                                        │
//!        └──── close() / TransportEvent::Closed ──┤
//!                                                 ▼
//!                                           4. Closed (terminal)
//! ```
//!
//! ## Data Path
//!
//! ```text
//! send()  ──► enqueue (command, completion) ──► encode ──► write / pipeline
//!
//! Data(bytes) ──► decode(state, bytes) ──► Response ──► Dispatcher ──► completion
//!                                                           │
//!                                                           ▼
//!                                                   ConnectionEvent::Status*
//! ```
//!
//! ## Pipelining
//!
//! In batch mode encoded requests pile up in a per-connection buffer instead
//! of being written. `exec()` writes the whole buffer at once. Only the
//! transmission is batched; every request is queued for its response at the
//! moment it is sent.

use crate::commands::Value;
use crate::config::ClientConfig;
use crate::connection::dispatcher::{Completion, DispatchError, Dispatcher, Outcome};
use crate::connection::transport::{Transport, TransportEvent};
use crate::error::{Error, Result};
use crate::protocol::{decode, encode_request, encode_request_into, status, DecoderState};
use bytes::{Bytes, BytesMut};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

/// Where the connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport yet; the next request connects
    Disconnected,
    /// Transport started, waiting for it to report `Connected`
    Connecting,
    /// Transport established
    Connected,
    /// Torn down for good
    Closed,
}

/// Whether requests are written immediately or buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Batch,
}

/// Notifications broadcast to connection subscribers.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The transport connected
    Connect,
    /// The transport failed; applies to the whole connection
    Error(Arc<io::Error>),
    /// The transport was idle for the configured time
    Timeout,
    /// The connection closed
    Close,
    /// A request completed with status `ok`
    StatusOk { command: String, value: Value },
    /// A request completed with status `not_found`
    StatusNotFound { command: String },
    /// A request completed with status `client_error`
    StatusClientError { command: String },
    /// A request completed with any status other than `ok`
    StatusNotOk { status: String, command: String },
    /// A response arrived with no request pending
    UnexpectedResponse { status: String },
}

/// Statistics for a connection
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Requests handed to the connection
    pub requests_sent: AtomicU64,
    /// Complete responses decoded
    pub responses_received: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
    /// Pipeline buffers flushed by `exec`
    pub pipeline_flushes: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn response_received(&self) {
        self.responses_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn pipeline_flushed(&self) {
        self.pipeline_flushes.fetch_add(1, Ordering::Relaxed);
    }
}

/// A single client connection to an SSDB server.
///
/// The connection is driven from one place: callers invoke `send`, `batch`,
/// `exec` and `close`, and whatever owns the transport feeds its
/// notifications into [`Connection::handle_event`]. Nothing here blocks or
/// locks.
pub struct Connection<T: Transport> {
    /// Server host
    host: String,

    /// Server port
    port: u16,

    /// The byte stream to the server
    transport: T,

    /// Lifecycle state
    state: ConnectionState,

    /// Normal or batch mode
    mode: Mode,

    /// Encoded requests waiting for `exec`
    pipeline: BytesMut,

    /// Number of requests in the pipeline buffer
    pipelined: usize,

    /// Bytes not yet part of a complete response
    decoder: DecoderState,

    /// Requests waiting for their responses
    dispatcher: Dispatcher,

    /// Subscriber fan-out
    events: broadcast::Sender<ConnectionEvent>,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<T: Transport> Connection<T> {
    /// Creates a disconnected connection. Nothing is dialed until the first
    /// request.
    pub fn new(config: &ClientConfig, transport: T) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            host: config.host.clone(),
            port: config.port,
            transport,
            state: ConnectionState::Disconnected,
            mode: Mode::Normal,
            pipeline: BytesMut::new(),
            pipelined: 0,
            decoder: DecoderState::new(),
            dispatcher: Dispatcher::new(),
            events,
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Number of requests awaiting a response.
    pub fn pending(&self) -> usize {
        self.dispatcher.len()
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Subscribes to connection events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// A handle that can create subscriptions without access to the
    /// connection itself.
    pub fn event_sender(&self) -> broadcast::Sender<ConnectionEvent> {
        self.events.clone()
    }

    /// Shared statistics.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Issues a request.
    ///
    /// The request is queued for its response before anything is written.
    /// In batch mode the encoded frame goes to the pipeline buffer instead of
    /// the transport.
    ///
    /// A request rejected before it was queued (closed connection, failed
    /// connect) has its completion resolved with the error as well.
    pub fn send(&mut self, command: &str, params: &[Bytes], completion: Completion) -> Result<()> {
        if self.state == ConnectionState::Closed {
            let _ = completion.send(Err(Error::ConnectionClosed));
            return Err(Error::ConnectionClosed);
        }

        if let Err(e) = self.ensure_connected() {
            let _ = completion.send(Err(copy_error(&e)));
            return Err(e);
        }

        self.dispatcher.enqueue(command, completion);
        self.stats.request_sent();

        match self.mode {
            Mode::Batch => {
                encode_request_into(&mut self.pipeline, command, params);
                self.pipelined += 1;
                trace!(
                    command = %command,
                    buffered = self.pipeline.len(),
                    "Request added to pipeline"
                );
                Ok(())
            }
            Mode::Normal => {
                trace!(command = %command, pending = self.dispatcher.len(), "Sending request");
                self.write(encode_request(command, params))
            }
        }
    }

    /// Enters batch mode.
    pub fn batch(&mut self) {
        if self.mode != Mode::Batch {
            debug!("Entering batch mode");
        }
        self.mode = Mode::Batch;
    }

    /// Writes the pipeline buffer in one go and leaves batch mode.
    pub fn exec(&mut self) -> Result<()> {
        self.mode = Mode::Normal;
        let frames = self.pipeline.split().freeze();
        let requests = std::mem::take(&mut self.pipelined);

        if self.state == ConnectionState::Closed {
            return Err(Error::ConnectionClosed);
        }

        self.ensure_connected()?;

        if frames.is_empty() {
            return Ok(());
        }

        debug!(requests, bytes = frames.len(), "Flushing pipeline");
        self.write(frames)?;
        self.stats.pipeline_flushed();
        Ok(())
    }

    /// Tears the connection down. Pending requests are abandoned.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }

        self.transport.close();
        self.shut_down();
    }

    /// Feeds one transport notification into the connection.
    pub fn handle_event(&mut self, event: TransportEvent) {
        if self.state == ConnectionState::Closed {
            trace!(event = ?event, "Ignoring transport event after close");
            return;
        }

        match event {
            TransportEvent::Connected => {
                self.state = ConnectionState::Connected;
                info!(server = %self.address(), "Connected");
                self.emit(ConnectionEvent::Connect);
            }
            TransportEvent::Data(bytes) => self.on_data(&bytes),
            TransportEvent::Error(e) => {
                warn!(server = %self.address(), error = %e, "Transport error");
                self.emit(ConnectionEvent::Error(Arc::new(e)));
            }
            TransportEvent::Timeout => {
                debug!(
                    server = %self.address(),
                    pending = self.dispatcher.len(),
                    "Connection idle timeout"
                );
                self.emit(ConnectionEvent::Timeout);
            }
            TransportEvent::Closed => {
                self.transport.close();
                self.shut_down();
            }
        }
    }

    /// Decodes received bytes and resolves the matching requests.
    fn on_data(&mut self, bytes: &[u8]) {
        self.stats.bytes_read(bytes.len());

        let (responses, state) = decode(std::mem::take(&mut self.decoder), bytes);
        self.decoder = state;

        for response in responses {
            self.stats.response_received();

            match self.dispatcher.dispatch(response) {
                Ok(outcome) => self.notify(outcome),
                Err(e) => {
                    error!(server = %self.address(), error = %e, "Response/request desync");
                    let DispatchError::Unsolicited { status } = e;
                    self.emit(ConnectionEvent::UnexpectedResponse { status });
                }
            }
        }
    }

    /// Broadcasts the status notifications for a dispatched response.
    fn notify(&self, outcome: Outcome) {
        match outcome {
            Outcome::Ok { command, value } => {
                self.emit(ConnectionEvent::StatusOk { command, value });
            }
            Outcome::InvalidReply { command } => {
                warn!(command = %command, "Reply payload does not match the command's kind");
            }
            Outcome::NotFound { command } => {
                self.emit(ConnectionEvent::StatusNotFound {
                    command: command.clone(),
                });
                self.emit(ConnectionEvent::StatusNotOk {
                    status: status::NOT_FOUND.to_string(),
                    command,
                });
            }
            Outcome::ClientError { command } => {
                self.emit(ConnectionEvent::StatusClientError {
                    command: command.clone(),
                });
                self.emit(ConnectionEvent::StatusNotOk {
                    status: status::CLIENT_ERROR.to_string(),
                    command,
                });
            }
            Outcome::Failed { status, command } => {
                self.emit(ConnectionEvent::StatusNotOk { status, command });
            }
        }
    }

    /// Dials the server if nothing has been dialed yet.
    fn ensure_connected(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Disconnected => {
                debug!(server = %self.address(), "Connecting");
                if let Err(e) = self.transport.connect(&self.host, self.port) {
                    warn!(server = %self.address(), error = %e, "Connect failed");
                    self.emit(ConnectionEvent::Error(Arc::new(copy_io_error(&e))));
                    return Err(Error::Transport(e));
                }
                self.state = ConnectionState::Connecting;
                Ok(())
            }
            ConnectionState::Connecting | ConnectionState::Connected => Ok(()),
            ConnectionState::Closed => Err(Error::ConnectionClosed),
        }
    }

    /// Hands bytes to the transport.
    fn write(&mut self, bytes: Bytes) -> Result<()> {
        let len = bytes.len();
        match self.transport.write(bytes) {
            Ok(()) => {
                self.stats.bytes_written(len);
                Ok(())
            }
            Err(e) => {
                warn!(server = %self.address(), error = %e, "Write failed");
                self.emit(ConnectionEvent::Error(Arc::new(copy_io_error(&e))));
                Err(Error::Transport(e))
            }
        }
    }

    /// Moves to `Closed` and drops everything that was in flight.
    fn shut_down(&mut self) {
        self.state = ConnectionState::Closed;
        self.mode = Mode::Normal;
        self.pipeline.clear();
        self.pipelined = 0;
        self.decoder = DecoderState::new();

        let abandoned = self.dispatcher.abandon();
        if abandoned > 0 {
            warn!(server = %self.address(), abandoned, "Connection closed with requests pending");
        } else {
            info!(server = %self.address(), "Connection closed");
        }

        self.emit(ConnectionEvent::Close);
    }

    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `io::Error` is not `Clone`; keep kind and message.
fn copy_io_error(e: &io::Error) -> io::Error {
    io::Error::new(e.kind(), e.to_string())
}

fn copy_error(e: &Error) -> Error {
    match e {
        Error::Transport(io) => Error::Transport(copy_io_error(io)),
        _ => Error::ConnectionClosed,
    }
}
