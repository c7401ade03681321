//! # ssdb-client - An Async Client for SSDB
//!
//! `ssdb-client` talks to [SSDB](https://github.com/ideawu/ssdb) servers over
//! their length-prefixed text protocol. It is built on Tokio and keeps one
//! ordered connection per [`Client`], pairing responses with requests purely
//! by order.
//!
//! ## Features
//!
//! - **Resumable Decoding**: Responses may arrive split across any number of reads
//! - **Binary Safe**: Keys and values are arbitrary bytes
//! - **Pipelining**: Buffer many requests and send them in a single write
//! - **Typed Replies**: Each command's reply is coerced to an integer, float,
//!   string, boolean or list
//! - **Events**: Connection lifecycle and per-request status notifications
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              ssdb-client                                │
//! │                                                                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │   Client    │───>│           Connection Task                    │    │
//! │  │  (handles)  │    │  ┌────────────┐ ┌───────────┐ ┌───────────┐  │    │
//! │  └──────▲──────┘    │  │ Connection │ │Dispatcher │ │ Pipeline  │  │    │
//! │         │           │  │   state    │ │  (FIFO)   │ │  buffer   │  │    │
//! │   ReplyFuture       │  └────────────┘ └─────▲─────┘ └───────────┘  │    │
//! │         │           └───────────────────────┼──────────────────────┘    │
//! │         │                                   │                           │
//! │  ┌──────┴──────┐    ┌─────────────┐    ┌────┴────────┐                  │
//! │  │  Command    │    │ TcpTransport│───>│  Protocol   │                  │
//! │  │   Table     │    │ (socket)    │    │  Decoder    │                  │
//! │  └─────────────┘    └─────────────┘    └─────────────┘                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use ssdb_client::{args, Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> ssdb_client::Result<()> {
//!     let client = Client::new(ClientConfig::new("127.0.0.1", 8888));
//!
//!     client.set(["name", "Ariz"]).await?;
//!     client.hset(args!["user:1", "visits", 10]).await?;
//!
//!     match client.get(["name"]).await?.into_option() {
//!         Some(name) => println!("name = {}", name),
//!         None => println!("name is not set"),
//!     }
//!
//!     let total = client.hincr(args!["user:1", "visits", 1]).value().await?;
//!     println!("visits = {}", total);
//!
//!     client.quit()
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: Request encoder and resumable response decoder
//! - [`commands`]: Command table, reply coercion and argument conversion
//! - [`connection`]: Response dispatcher, transport and connection state machine
//! - [`client`]: Async handle driving a connection from a background task
//! - [`config`]: Client configuration
//! - [`error`]: Error types
//!
//! ## Design Highlights
//!
//! ### Ordered Pairing
//!
//! SSDB responses carry no request id. Every request is queued together with
//! its completion before its bytes are written, and every complete response
//! resolves the oldest queued request. A `not_found` response resolves only
//! its own request.
//!
//! ### Zero-Copy Decoding
//!
//! The decoder slices values out of the received `bytes::Bytes` buffer
//! instead of copying them, and keeps at most one incomplete response between
//! reads.

pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;

// Re-export commonly used types for convenience
pub use bytes::Bytes;
pub use client::{Client, ReplyFuture};
pub use commands::{ResultKind, ToArg, Value};
pub use config::ClientConfig;
pub use connection::{ConnectionEvent, ConnectionStats, Reply};
pub use error::{Error, Result};
pub use protocol::{decode, encode_request, DecoderState, Response};

/// The default port of an SSDB server
pub const DEFAULT_PORT: u16 = 8888;

/// The default host of an SSDB server
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of ssdb-client
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
