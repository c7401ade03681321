//! SSDB Protocol Data Types
//!
//! This module defines the block format used by SSDB for both requests and
//! responses, together with the request encoder.
//!
//! ## Protocol Format
//!
//! A block is a sequence of length-prefixed values followed by a blank line:
//!
//! ```text
//! <length>\n<raw bytes>\n
//! <length>\n<raw bytes>\n
//! ...
//! \n
//! ```
//!
//! Values are never escaped. The declared byte length, not a delimiter,
//! bounds each value, so values may contain newlines or NUL bytes.
//!
//! ## Examples
//!
//! Request `set key1 val1`: `3\nset\n4\nkey1\n4\nval1\n\n`
//! Response `ok 1`: `2\nok\n1\n1\n\n`

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The newline delimiter that ends length lines, values and blocks
pub const LF: u8 = b'\n';

/// Carriage return, tolerated before a delimiter
pub const CR: u8 = b'\r';

/// Well-known response status codes
pub mod status {
    pub const OK: &str = "ok";
    pub const NOT_FOUND: &str = "not_found";
    pub const CLIENT_ERROR: &str = "client_error";
}

/// A complete response block.
///
/// Element 0 is the status code and the remaining elements are the payload.
/// A `Response` only exists once its terminating blank line has been seen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    frames: Vec<Bytes>,
}

impl Response {
    /// Creates a response from its raw frames (status first).
    pub fn new(frames: Vec<Bytes>) -> Self {
        Self { frames }
    }

    /// Builds a response from a status and payload, mostly useful in tests.
    pub fn with_status<I, B>(status: &str, payload: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let mut frames = vec![Bytes::copy_from_slice(status.as_bytes())];
        frames.extend(payload.into_iter().map(Into::into));
        Self { frames }
    }

    /// The status code, if the block carried one and it is valid UTF-8.
    pub fn status(&self) -> Option<&str> {
        self.frames
            .first()
            .and_then(|s| std::str::from_utf8(s).ok())
    }

    /// The payload frames following the status.
    pub fn payload(&self) -> &[Bytes] {
        self.frames.get(1..).unwrap_or(&[])
    }

    /// All frames, status included.
    pub fn frames(&self) -> &[Bytes] {
        &self.frames
    }

    /// Consumes the response and returns `(status, payload)`.
    ///
    /// An empty block yields an empty status.
    pub fn into_parts(self) -> (String, Vec<Bytes>) {
        let mut frames = self.frames.into_iter();
        let status = frames
            .next()
            .map(|s| String::from_utf8_lossy(&s).into_owned())
            .unwrap_or_default();
        (status, frames.collect())
    }

    /// Returns true if the status is `ok`.
    pub fn is_ok(&self) -> bool {
        self.status() == Some(status::OK)
    }

    /// Serializes the response back into its wire format.
    ///
    /// Responses and requests share the same framing, which makes this handy
    /// for fake servers.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        for frame in &self.frames {
            put_value(&mut buf, frame);
        }
        buf.put_u8(LF);
        buf.freeze()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status().unwrap_or("<none>");
        write!(f, "{}", status)?;
        for value in self.payload() {
            match std::str::from_utf8(value) {
                Ok(s) => write!(f, " \"{}\"", s)?,
                Err(_) => write!(f, " (binary data, {} bytes)", value.len())?,
            }
        }
        Ok(())
    }
}

/// Encodes a request block.
///
/// # Example
///
/// ```
/// use ssdb_client::protocol::encode_request;
/// use bytes::Bytes;
///
/// let frame = encode_request("set", &[Bytes::from("key1"), Bytes::from("val1")]);
/// assert_eq!(&frame[..], b"3\nset\n4\nkey1\n4\nval1\n\n");
/// ```
pub fn encode_request(command: &str, params: &[Bytes]) -> Bytes {
    let size = encoded_len(command, params);
    let mut buf = BytesMut::with_capacity(size);
    encode_request_into(&mut buf, command, params);
    buf.freeze()
}

/// Encodes a request block into an existing buffer.
///
/// This is what the pipeline buffer uses to accumulate several requests.
pub fn encode_request_into(buf: &mut BytesMut, command: &str, params: &[Bytes]) {
    buf.reserve(encoded_len(command, params));
    put_value(buf, command.as_bytes());
    for param in params {
        put_value(buf, param);
    }
    buf.put_u8(LF);
}

/// Exact size of the encoded block.
fn encoded_len(command: &str, params: &[Bytes]) -> usize {
    let field = |len: usize| decimal_len(len) + 1 + len + 1;
    field(command.len()) + params.iter().map(|p| field(p.len())).sum::<usize>() + 1
}

fn decimal_len(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

#[inline]
fn put_value(buf: &mut BytesMut, value: &[u8]) {
    buf.extend_from_slice(value.len().to_string().as_bytes());
    buf.put_u8(LF);
    buf.extend_from_slice(value);
    buf.put_u8(LF);
}
