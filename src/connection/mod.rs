//! Connection Module
//!
//! This module manages a single connection to an SSDB server: the transport
//! contract, the pairing of responses with requests, and the state machine
//! that ties them together.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Connection<T>                          │
//! │                                                             │
//! │  send() ─► ┌─────────────┐    ┌─────────────┐               │
//! │            │ Dispatcher  │    │  Pipeline   │ ─► exec()     │
//! │            │ (FIFO queue)│    │  (batch)    │               │
//! │            └──────▲──────┘    └──────┬──────┘               │
//! │                   │                  │                      │
//! │            ┌──────┴──────┐           ▼                      │
//! │            │   decode()  │    ┌─────────────┐               │
//! │            └──────▲──────┘    │ Transport T │               │
//! │                   └───────────┤ (TCP, mock) │               │
//! │                 TransportEvent└─────────────┘               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Lazy connect**: The transport is dialed by the first request
//! - **FIFO pairing**: Responses resolve requests strictly in send order
//! - **Pipelining**: `batch()` / `exec()` send many requests in one write
//! - **Events**: Lifecycle and status notifications on a broadcast channel
//! - **Statistics**: Tracks request and byte counters

pub mod dispatcher;
pub mod handler;
pub mod transport;

// Re-export commonly used types
pub use dispatcher::{Completion, DispatchError, Dispatcher, Outcome, Reply};
pub use handler::{Connection, ConnectionEvent, ConnectionState, ConnectionStats, Mode};
pub use transport::{TcpTransport, Transport, TransportEvent};
