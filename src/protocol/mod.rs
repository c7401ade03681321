//! SSDB Protocol Implementation
//!
//! This module provides the wire codec for the SSDB protocol.
//!
//! ## Overview
//!
//! Requests and responses share one framing: a block of length-prefixed
//! values closed by a blank line. The first value of a request is the command
//! name, the first value of a response is its status code.
//!
//! ## Modules
//!
//! - `types`: Defines `Response` and the request encoder
//! - `parser`: Resumable decoder for incoming response bytes
//!
//! ## Example
//!
//! ```
//! use ssdb_client::protocol::{decode, encode_request, DecoderState};
//! use bytes::Bytes;
//!
//! // Encoding a request
//! let frame = encode_request("get", &[Bytes::from("name")]);
//! assert_eq!(&frame[..], b"3\nget\n4\nname\n\n");
//!
//! // Decoding responses as they arrive
//! let (responses, _state) = decode(DecoderState::new(), b"2\nok\n4\nAriz\n\n");
//! assert_eq!(responses[0].payload()[0], Bytes::from("Ariz"));
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{decode, DecoderState};
pub use types::{encode_request, encode_request_into, status, Response};
