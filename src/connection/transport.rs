//! Transport Layer
//!
//! The connection only needs an ordered, reliable byte stream that can
//! connect, write and close, and that reports what happens to it. That
//! contract is the [`Transport`] trait plus the [`TransportEvent`]
//! notifications it emits.
//!
//! [`TcpTransport`] is the built-in implementation on top of tokio. Reading
//! and writing run in separate tasks, so the socket keeps being drained while
//! a large write is blocked on a full send buffer:
//!
//! ```text
//! Connection ── write(bytes) ──► mpsc ──► Writer Task ──► OwnedWriteHalf
//!     ▲
//!     └──── TransportEvent (mpsc) ◄──── Socket Task ◄──── OwnedReadHalf
//!          Connected / Data / Error / Timeout / Closed
//! ```

use crate::config::ClientConfig;
use bytes::{Bytes, BytesMut};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Initial read buffer capacity
const READ_BUFFER_SIZE: usize = 4096;

/// Maximum queued writes drained before a flush
const MAX_WRITE_BATCH: usize = 64;

/// Lifecycle and data notifications raised by a transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// The stream is established
    Connected,
    /// Bytes arrived, in stream order
    Data(Bytes),
    /// Connecting, reading or writing failed
    Error(io::Error),
    /// No traffic for the configured idle time
    Timeout,
    /// The stream is gone. Nothing follows this event.
    Closed,
}

/// An ordered, reliable byte stream.
///
/// Calls never block. Outcomes of `connect` and failures of `write` that
/// happen later are reported through [`TransportEvent`]s.
pub trait Transport {
    /// Starts connecting to `host:port`.
    fn connect(&mut self, host: &str, port: u16) -> io::Result<()>;

    /// Queues bytes for sending. Bytes written before the stream is
    /// established are sent once it is.
    fn write(&mut self, bytes: Bytes) -> io::Result<()>;

    /// Tears the stream down.
    fn close(&mut self);
}

/// [`Transport`] backed by a `tokio::net::TcpStream`.
///
/// Each connection attempt runs in its own task, which owns the socket and
/// forwards everything it observes as [`TransportEvent`]s.
pub struct TcpTransport {
    events: mpsc::UnboundedSender<TransportEvent>,
    timeout: Option<Duration>,
    nodelay: bool,
    keepalive: bool,
    writer: Option<mpsc::UnboundedSender<Bytes>>,
    task: Option<JoinHandle<()>>,
}

impl TcpTransport {
    /// Creates a transport that reports to `events`.
    pub fn new(config: &ClientConfig, events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            events,
            timeout: config.timeout,
            nodelay: config.nodelay,
            keepalive: config.keepalive,
            writer: None,
            task: None,
        }
    }

    /// Creates a transport together with the receiving end of its events.
    pub fn channel(config: &ClientConfig) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(config, tx), rx)
    }

    /// Returns true while a socket task is running.
    pub fn is_open(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, host: &str, port: u16) -> io::Result<()> {
        if self.task.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "transport already connected",
            ));
        }

        let (writer, outgoing) = mpsc::unbounded_channel();
        let socket = SocketTask {
            address: format!("{}:{}", host, port),
            events: self.events.clone(),
            timeout: self.timeout,
            nodelay: self.nodelay,
            keepalive: self.keepalive,
        };

        self.writer = Some(writer);
        self.task = Some(tokio::spawn(socket.run(outgoing)));
        Ok(())
    }

    fn write(&mut self, bytes: Bytes) -> io::Result<()> {
        match &self.writer {
            Some(writer) => writer.send(bytes).map_err(|_| {
                io::Error::new(io::ErrorKind::BrokenPipe, "socket task has stopped")
            }),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport is not connected",
            )),
        }
    }

    fn close(&mut self) {
        // Dropping the sender also ends the writer task
        self.writer = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Owns one TCP stream for its whole life.
struct SocketTask {
    address: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    timeout: Option<Duration>,
    nodelay: bool,
    keepalive: bool,
}

impl SocketTask {
    async fn run(self, outgoing: mpsc::UnboundedReceiver<Bytes>) {
        let stream = match connect_stream(&self.address, self.keepalive).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(server = %self.address, error = %e, "Connect failed");
                self.emit(TransportEvent::Error(e));
                self.emit(TransportEvent::Closed);
                return;
            }
        };

        if let Err(e) = stream.set_nodelay(self.nodelay) {
            warn!(server = %self.address, error = %e, "Failed to set TCP_NODELAY");
        }

        debug!(server = %self.address, "Connected");
        self.emit(TransportEvent::Connected);

        let (mut reader, writer) = stream.into_split();
        let mut writer_task = tokio::spawn(write_loop(self.address.clone(), writer, outgoing));
        let mut buffer = BytesMut::with_capacity(READ_BUFFER_SIZE);

        loop {
            tokio::select! {
                written = &mut writer_task => {
                    match written {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => self.emit(TransportEvent::Error(e)),
                        Err(e) => warn!(server = %self.address, error = %e, "Writer task failed"),
                    }
                    // The transport handle was closed, or the socket can no
                    // longer be written
                    break;
                }
                read = read_chunk(&mut reader, &mut buffer, self.timeout) => match read {
                    Ok(Some(0)) => {
                        debug!(server = %self.address, "Server closed the connection");
                        writer_task.abort();
                        break;
                    }
                    Ok(Some(n)) => {
                        trace!(server = %self.address, bytes = n, "Read data");
                        self.emit(TransportEvent::Data(buffer.split().freeze()));
                    }
                    Ok(None) => self.emit(TransportEvent::Timeout),
                    Err(e) => {
                        self.emit(TransportEvent::Error(e));
                        writer_task.abort();
                        break;
                    }
                },
            }
        }

        self.emit(TransportEvent::Closed);
    }

    fn emit(&self, event: TransportEvent) {
        // The receiver only goes away together with the connection
        let _ = self.events.send(event);
    }
}

/// Writes queued bytes until the sending side is dropped.
///
/// Whatever is queued by the time a write finishes goes out before the next
/// flush.
async fn write_loop(
    address: String,
    mut writer: OwnedWriteHalf,
    mut outgoing: mpsc::UnboundedReceiver<Bytes>,
) -> io::Result<()> {
    while let Some(first) = outgoing.recv().await {
        let mut written = first.len();
        writer.write_all(&first).await?;

        let mut batched = 1;
        while batched < MAX_WRITE_BATCH {
            match outgoing.try_recv() {
                Ok(bytes) => {
                    writer.write_all(&bytes).await?;
                    written += bytes.len();
                    batched += 1;
                }
                Err(_) => break,
            }
        }

        writer.flush().await?;
        trace!(server = %address, bytes = written, writes = batched, "Wrote data");
    }

    Ok(())
}

/// Resolves `address` and connects to the first address that accepts.
async fn connect_stream(address: &str, keepalive: bool) -> io::Result<TcpStream> {
    let mut last_error = None;

    for addr in tokio::net::lookup_host(address).await? {
        match tcp_socket(addr, keepalive)?.connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "address did not resolve")
    }))
}

/// Creates an unconnected socket for `addr` with SO_KEEPALIVE applied.
fn tcp_socket(addr: SocketAddr, keepalive: bool) -> io::Result<TcpSocket> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_keepalive(keepalive)?;
    Ok(socket)
}

/// Reads whatever is available. `Ok(None)` means the idle timeout elapsed.
async fn read_chunk(
    reader: &mut OwnedReadHalf,
    buffer: &mut BytesMut,
    timeout: Option<Duration>,
) -> io::Result<Option<usize>> {
    if buffer.capacity() - buffer.len() < 1024 {
        buffer.reserve(READ_BUFFER_SIZE);
    }

    match timeout {
        Some(limit) => match tokio::time::timeout(limit, reader.read_buf(buffer)).await {
            Ok(read) => read.map(Some),
            Err(_) => Ok(None),
        },
        None => reader.read_buf(buffer).await.map(Some),
    }
}
