//! Resumable Response Decoder
//!
//! This module turns a stream of bytes into complete [`Response`] blocks.
//!
//! ## How the Decoder Works
//!
//! Decoding is an explicit state transition:
//!
//! ```text
//! decode(state, bytes) -> (responses, new_state)
//! ```
//!
//! The state holds the progress made on the response that is not complete
//! yet: the frames already decoded, the length of a value whose bytes are
//! still arriving, and the bytes not yet decoded. Each call:
//! 1. Appends the new bytes to the undecoded tail
//! 2. Continues from where the previous call stopped, releasing decoded
//!    bytes from the front of the buffer without copying them
//! 3. Extracts every response whose terminating blank line is present
//!
//! Decoded bytes are never scanned or copied again, so a large value
//! delivered in many small reads costs time linear in its size.
//!
//! A response delivered in one read and the same response split across any
//! number of reads decode to the same values.
//!
//! Malformed framing is never an error here. A length line that does not
//! parse, or a value that is not followed by a delimiter, looks exactly like a
//! response whose remaining bytes have not arrived yet, so it stays buffered.

use crate::protocol::types::{Response, CR, LF};
use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

/// Progress carried over between two [`decode`] calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderState {
    /// Bytes not decoded yet
    buffer: BytesMut,

    /// Frames of the response in progress
    frames: Vec<Bytes>,

    /// Declared length of the value at the front of `buffer`, once its
    /// length line has been consumed
    value_len: Option<usize>,

    /// Leading bytes of `buffer` known to contain no `\n`
    scanned: usize,

    /// Bytes of the response in progress already released from `buffer`
    consumed: usize,
}

impl DecoderState {
    /// Creates an empty decoder state.
    pub fn new() -> Self {
        Self::default()
    }

    /// The buffered bytes that have not been decoded yet.
    pub fn residual(&self) -> &[u8] {
        &self.buffer
    }

    /// Returns true if no response is in progress.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of bytes received since the last complete response.
    pub fn len(&self) -> usize {
        self.consumed + self.buffer.len()
    }

    /// Decodes the next response if all of its bytes are buffered.
    fn next_response(&mut self) -> Option<Response> {
        loop {
            if let Some(size) = self.value_len {
                // Value or its delimiter not fully arrived
                let delimiter = delimiter_len(&self.buffer, size)?;
                let value = self.buffer.split_to(size).freeze();
                self.buffer.advance(delimiter);
                self.frames.push(value);
                self.consumed += size + delimiter;
                self.value_len = None;
                continue;
            }

            let lf = match find_lf(&self.buffer[self.scanned..]) {
                Some(i) => self.scanned + i,
                None => {
                    self.scanned = self.buffer.len();
                    return None;
                }
            };
            self.scanned = 0;

            let line = &self.buffer[..lf];

            // A blank line ends the current response
            if line.is_empty() || line == [CR] {
                self.buffer.advance(lf + 1);
                self.consumed = 0;
                return Some(Response::new(std::mem::take(&mut self.frames)));
            }

            let size = match parse_length(line) {
                Some(size) => size,
                None => {
                    trace!(
                        offset = self.consumed,
                        "Unparsable length line, waiting for more data"
                    );
                    return None;
                }
            };

            self.buffer.advance(lf + 1);
            self.consumed += lf + 1;
            self.value_len = Some(size);
        }
    }
}

/// Decodes as many complete responses as `input` (plus the progress held in
/// `state`) contains.
///
/// # Example
///
/// ```
/// use ssdb_client::protocol::{decode, DecoderState};
///
/// let (responses, state) = decode(DecoderState::new(), b"2\nok\n1\n1");
/// assert!(responses.is_empty());
///
/// let (responses, state) = decode(state, b"\n\n");
/// assert_eq!(responses.len(), 1);
/// assert_eq!(responses[0].status(), Some("ok"));
/// assert!(state.is_empty());
/// ```
pub fn decode(mut state: DecoderState, input: &[u8]) -> (Vec<Response>, DecoderState) {
    state.buffer.extend_from_slice(input);

    let mut responses = Vec::new();
    while let Some(response) = state.next_response() {
        responses.push(response);
    }

    if !responses.is_empty() {
        trace!(
            responses = responses.len(),
            buffered = state.len(),
            "Decoded input"
        );
    }

    (responses, state)
}

/// Finds the first `\n` in the buffer.
#[inline]
fn find_lf(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == LF)
}

/// Parses a decimal length line, ignoring surrounding ASCII whitespace
/// (which also drops a `\r` before the newline).
fn parse_length(line: &[u8]) -> Option<usize> {
    std::str::from_utf8(line).ok()?.trim().parse().ok()
}

/// Length of the delimiter that must follow a value ending at `at`:
/// 1 for `\n`, 2 for `\r\n`, `None` if it is not (yet) there.
#[inline]
fn delimiter_len(buf: &[u8], at: usize) -> Option<usize> {
    match buf.get(at)? {
        &LF => Some(1),
        &CR if buf.get(at + 1) == Some(&LF) => Some(2),
        _ => None,
    }
}
