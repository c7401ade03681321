//! Response Dispatcher
//!
//! SSDB responses carry no request identifier. The only thing tying a
//! response to its request is order: the Nth response on a connection answers
//! the Nth request sent on it. The dispatcher keeps the pending requests in a
//! FIFO queue and resolves the oldest one for every response that arrives.
//!
//! ## Status Handling
//!
//! ```text
//! "ok"           → coerce payload with the command table → Reply::Value
//! "not_found"    → Reply::NotFound (payload ignored)
//! "client_error" → Error::Client
//! anything else  → Error::Protocol
//! ```
//!
//! A response that arrives while nothing is pending means the stream is out
//! of sync with the requests. That is reported as
//! [`DispatchError::Unsolicited`] and never silently dropped.

use crate::commands::{result_kind_or_default, Value};
use crate::error::{Error, Result};
use crate::protocol::{status, Response};
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::trace;

/// Completion handle of a pending request.
pub type Completion = oneshot::Sender<Result<Reply>>;

/// Successful outcome of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Status `ok`, payload coerced to the command's kind
    Value(Value),

    /// Status `not_found`: the key, field or member does not exist
    NotFound { command: String },
}

impl Reply {
    /// Returns true for `Reply::NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Reply::NotFound { .. })
    }

    /// Borrows the value, if there is one.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Reply::Value(v) => Some(v),
            Reply::NotFound { .. } => None,
        }
    }

    /// Treats `not_found` as an absent value.
    pub fn into_option(self) -> Option<Value> {
        match self {
            Reply::Value(v) => Some(v),
            Reply::NotFound { .. } => None,
        }
    }

    /// Treats `not_found` as an error.
    pub fn into_value(self) -> Result<Value> {
        match self {
            Reply::Value(v) => Ok(v),
            Reply::NotFound { command } => Err(Error::NotFound { command }),
        }
    }
}

/// What a dispatched response turned out to be.
///
/// The connection turns this into status notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// `ok` with a well-formed payload
    Ok { command: String, value: Value },
    /// `ok`, but the payload did not fit the command's kind
    InvalidReply { command: String },
    /// `not_found`
    NotFound { command: String },
    /// `client_error`
    ClientError { command: String },
    /// Any other status
    Failed { status: String, command: String },
}

impl Outcome {
    /// The command the response answered.
    pub fn command(&self) -> &str {
        match self {
            Outcome::Ok { command, .. }
            | Outcome::InvalidReply { command }
            | Outcome::NotFound { command }
            | Outcome::ClientError { command }
            | Outcome::Failed { command, .. } => command,
        }
    }
}

/// Errors reported by the dispatcher itself.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    /// A response arrived while no request was pending
    #[error("unsolicited response with status '{status}': no request is pending")]
    Unsolicited { status: String },
}

/// A request waiting for its response.
#[derive(Debug)]
pub struct PendingRequest {
    /// Command name, used to pick the result kind
    pub command: String,
    /// Where the outcome goes
    pub completion: Completion,
}

/// FIFO queue of pending requests.
///
/// Command names and completions are pushed and popped together, so the two
/// can never get out of step.
#[derive(Debug, Default)]
pub struct Dispatcher {
    pending: VecDeque<PendingRequest>,
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a request. Must be called before its frame is written.
    pub fn enqueue(&mut self, command: impl Into<String>, completion: Completion) {
        self.pending.push_back(PendingRequest {
            command: command.into(),
            completion,
        });
    }

    /// Number of requests awaiting a response.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if no request is awaiting a response.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Command names of the pending requests, oldest first.
    pub fn pending_commands(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(|p| p.command.as_str())
    }

    /// Resolves the oldest pending request with `response`.
    pub fn dispatch(&mut self, response: Response) -> std::result::Result<Outcome, DispatchError> {
        let PendingRequest {
            command,
            completion,
        } = match self.pending.pop_front() {
            Some(request) => request,
            None => {
                return Err(DispatchError::Unsolicited {
                    status: response.status().unwrap_or_default().to_string(),
                })
            }
        };

        let (status, payload) = response.into_parts();

        let (result, outcome) = match status.as_str() {
            status::OK => {
                let kind = result_kind_or_default(&command);
                match kind.coerce(payload) {
                    Ok(value) => (
                        Ok(Reply::Value(value.clone())),
                        Outcome::Ok { command, value },
                    ),
                    Err(source) => (
                        Err(Error::InvalidReply {
                            command: command.clone(),
                            source,
                        }),
                        Outcome::InvalidReply { command },
                    ),
                }
            }
            status::NOT_FOUND => (
                Ok(Reply::NotFound {
                    command: command.clone(),
                }),
                Outcome::NotFound { command },
            ),
            status::CLIENT_ERROR => (
                Err(Error::Client {
                    command: command.clone(),
                }),
                Outcome::ClientError { command },
            ),
            _ => (
                Err(Error::Protocol {
                    status: status.clone(),
                    command: command.clone(),
                }),
                Outcome::Failed { status, command },
            ),
        };

        if completion.send(result).is_err() {
            trace!(command = %outcome.command(), "Reply receiver dropped");
        }

        Ok(outcome)
    }

    /// Drops every pending request. Their callers observe
    /// [`Error::Abandoned`](crate::Error::Abandoned).
    ///
    /// Returns how many requests were abandoned.
    pub fn abandon(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::sync::oneshot::error::TryRecvError;

    fn enqueue(d: &mut Dispatcher, command: &str) -> oneshot::Receiver<Result<Reply>> {
        let (tx, rx) = oneshot::channel();
        d.enqueue(command, tx);
        rx
    }

    #[test]
    fn test_ok_integer() {
        let mut d = Dispatcher::new();
        let mut rx = enqueue(&mut d, "set");

        let outcome = d.dispatch(Response::with_status("ok", ["1"])).unwrap();
        assert_eq!(
            outcome,
            Outcome::Ok {
                command: "set".to_string(),
                value: Value::Integer(1)
            }
        );

        let reply = rx.try_recv().unwrap().unwrap();
        assert_eq!(reply, Reply::Value(Value::Integer(1)));
        assert!(d.is_empty());
    }

    #[test]
    fn test_ok_boolean() {
        let mut d = Dispatcher::new();
        let mut rx_false = enqueue(&mut d, "exists");
        let mut rx_true = enqueue(&mut d, "exists");

        d.dispatch(Response::with_status("ok", ["0"])).unwrap();
        d.dispatch(Response::with_status("ok", ["5"])).unwrap();

        let no = rx_false.try_recv().unwrap().unwrap();
        let yes = rx_true.try_recv().unwrap().unwrap();
        assert_eq!(no.value(), Some(&Value::Boolean(false)));
        assert_eq!(yes.value(), Some(&Value::Boolean(true)));
    }

    #[test]
    fn test_unknown_command_is_string() {
        let mut d = Dispatcher::new();
        let mut rx = enqueue(&mut d, "flushdb");

        d.dispatch(Response::with_status("ok", ["done"])).unwrap();

        let reply = rx.try_recv().unwrap().unwrap();
        assert_eq!(reply, Reply::Value(Value::String(Bytes::from("done"))));
    }

    #[test]
    fn test_not_found_only_resolves_its_own_request() {
        let mut d = Dispatcher::new();
        let mut rx_get = enqueue(&mut d, "get");
        let mut rx_set = enqueue(&mut d, "set");

        let outcome = d
            .dispatch(Response::with_status("not_found", ["ignored"]))
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::NotFound {
                command: "get".to_string()
            }
        );

        let reply = rx_get.try_recv().unwrap().unwrap();
        assert!(reply.is_not_found());
        assert_eq!(reply.clone().into_option(), None);
        assert!(reply.into_value().unwrap_err().is_not_found());

        // The sibling is untouched
        assert_eq!(rx_set.try_recv().unwrap_err(), TryRecvError::Empty);
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn test_client_error() {
        let mut d = Dispatcher::new();
        let mut rx = enqueue(&mut d, "zset");

        d.dispatch(Response::with_status("client_error", ["wrong args"]))
            .unwrap();

        let err = rx.try_recv().unwrap().unwrap_err();
        assert!(matches!(err, Error::Client { ref command } if command == "zset"));
    }

    #[test]
    fn test_unknown_status_is_protocol_error() {
        let mut d = Dispatcher::new();
        let mut rx = enqueue(&mut d, "set");

        let outcome = d.dispatch(Response::with_status("error", ["x"])).unwrap();
        assert_eq!(
            outcome,
            Outcome::Failed {
                status: "error".to_string(),
                command: "set".to_string()
            }
        );

        let err = rx.try_recv().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "ssdb: 'error' on command 'set'");
    }

    #[test]
    fn test_bad_payload_still_pops_request() {
        let mut d = Dispatcher::new();
        let mut rx_incr = enqueue(&mut d, "incr");
        let mut rx_get = enqueue(&mut d, "get");

        d.dispatch(Response::with_status("ok", ["NaN"])).unwrap();
        d.dispatch(Response::with_status("ok", ["v"])).unwrap();

        let err = rx_incr.try_recv().unwrap().unwrap_err();
        assert!(matches!(err, Error::InvalidReply { .. }));

        let reply = rx_get.try_recv().unwrap().unwrap();
        assert_eq!(reply.value().and_then(|v| v.as_str()), Some("v"));
    }

    #[test]
    fn test_fifo_order() {
        let mut d = Dispatcher::new();
        let receivers: Vec<_> = (0..5).map(|_| enqueue(&mut d, "incr")).collect();

        for i in 0..5 {
            d.dispatch(Response::with_status("ok", [i.to_string()]))
                .unwrap();
        }

        for (i, mut rx) in receivers.into_iter().enumerate() {
            let reply = rx.try_recv().unwrap().unwrap();
            assert_eq!(reply, Reply::Value(Value::Integer(i as i64)));
        }
    }

    #[test]
    fn test_unsolicited_response() {
        let mut d = Dispatcher::new();
        let err = d.dispatch(Response::with_status("ok", ["1"])).unwrap_err();
        assert_eq!(
            err,
            DispatchError::Unsolicited {
                status: "ok".to_string()
            }
        );
    }

    #[test]
    fn test_dropped_receiver_does_not_break_dispatch() {
        let mut d = Dispatcher::new();
        drop(enqueue(&mut d, "set"));
        let mut rx = enqueue(&mut d, "set");

        d.dispatch(Response::with_status("ok", ["1"])).unwrap();
        d.dispatch(Response::with_status("ok", ["2"])).unwrap();

        let reply = rx.try_recv().unwrap().unwrap();
        assert_eq!(reply, Reply::Value(Value::Integer(2)));
    }

    #[test]
    fn test_abandon() {
        let mut d = Dispatcher::new();
        let mut rx = enqueue(&mut d, "get");
        enqueue(&mut d, "get");

        assert_eq!(d.pending_commands().collect::<Vec<_>>(), vec!["get", "get"]);
        assert_eq!(d.abandon(), 2);
        assert!(d.is_empty());
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Closed);
    }
}
