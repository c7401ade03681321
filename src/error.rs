//! Error types for the SSDB client
//!
//! Request-level outcomes are delivered to the request that caused them.
//! Connection-level failures are broadcast as
//! [`ConnectionEvent`](crate::connection::ConnectionEvent)s instead, since
//! they cannot be pinned on a single request.

use crate::commands::CoerceError;
use thiserror::Error;

/// Result type alias using the client [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The server answered with a status the client does not recognize
    #[error("ssdb: '{status}' on command '{command}'")]
    Protocol { status: String, command: String },

    /// The key (or field, or member) does not exist
    #[error("ssdb: 'not_found' on command '{command}'")]
    NotFound { command: String },

    /// The server rejected the request as malformed
    #[error("ssdb: 'client_error' on command '{command}'")]
    Client { command: String },

    /// The status was `ok` but the payload did not fit the command's kind
    #[error("ssdb: invalid reply to command '{command}': {source}")]
    InvalidReply {
        command: String,
        source: CoerceError,
    },

    /// The transport failed to connect or write
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The connection has been closed and accepts no more requests
    #[error("connection closed")]
    ConnectionClosed,

    /// The connection went away while the request was still pending
    #[error("request abandoned before a response arrived")]
    Abandoned,
}

impl Error {
    /// Returns true for [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// The command this error is about, when it is request-specific.
    pub fn command(&self) -> Option<&str> {
        match self {
            Error::Protocol { command, .. }
            | Error::NotFound { command }
            | Error::Client { command }
            | Error::InvalidReply { command, .. } => Some(command),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = Error::Protocol {
            status: "error".to_string(),
            command: "set".to_string(),
        };
        assert_eq!(err.to_string(), "ssdb: 'error' on command 'set'");
        assert_eq!(err.command(), Some("set"));

        let err = Error::NotFound {
            command: "get".to_string(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "ssdb: 'not_found' on command 'get'");
    }

    #[test]
    fn test_invalid_reply_keeps_source() {
        let err = Error::InvalidReply {
            command: "incr".to_string(),
            source: CoerceError::EmptyPayload,
        };
        assert_eq!(
            err.to_string(),
            "ssdb: invalid reply to command 'incr': empty payload"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_connection_errors_have_no_command() {
        assert_eq!(Error::ConnectionClosed.command(), None);
        assert_eq!(Error::Abandoned.command(), None);
    }
}
