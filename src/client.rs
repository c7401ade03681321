//! Async Client
//!
//! [`Client`] is a cheap, cloneable handle to one SSDB connection. The
//! connection itself lives in a background task that owns the TCP transport
//! and processes caller requests and transport notifications one at a time,
//! so the FIFO pairing of responses never needs a lock.
//!
//! ```text
//! Client ─┐
//! Client ─┼─► mpsc<Request> ─┐
//! Client ─┘                  ▼
//!                    ┌──────────────────┐      ┌─────────────┐
//!                    │ Connection Task  │◄─────│ TcpTransport│
//!                    │ Connection<Tcp>  │ Tx   │ socket task │
//!                    └────────┬─────────┘Event └─────────────┘
//!                             │
//!                    oneshot per request ──► ReplyFuture
//! ```
//!
//! # Example
//!
//! ```ignore
//! use ssdb_client::{args, Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> ssdb_client::Result<()> {
//!     let client = Client::new(ClientConfig::new("127.0.0.1", 8888));
//!
//!     client.set(["name", "Ariz"]).await?;
//!     let name = client.get(["name"]).await?.into_option();
//!     println!("{:?}", name);
//!
//!     // Pipelining: one write for all three requests
//!     client.batch()?;
//!     let a = client.incr(args!["counter", 1]);
//!     let b = client.incr(args!["counter", 1]);
//!     let c = client.get(["counter"]);
//!     client.exec()?;
//!     println!("{:?} {:?} {:?}", a.await?, b.await?, c.await?);
//!
//!     client.quit()
//! }
//! ```

use crate::commands::table::for_each_command;
use crate::commands::{ToArg, Value};
use crate::config::ClientConfig;
use crate::connection::{
    Completion, Connection, ConnectionEvent, ConnectionStats, Reply, TcpTransport, TransportEvent,
};
use crate::error::{Error, Result};
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, trace, warn};

/// Messages from client handles to the connection task.
#[derive(Debug)]
enum Request {
    Call {
        command: String,
        params: Vec<Bytes>,
        completion: Completion,
    },
    Batch,
    Exec,
    Quit,
}

/// Future resolving to the outcome of one request.
///
/// Resolves to [`Error::Abandoned`] if the connection goes away first.
#[derive(Debug)]
#[must_use = "the reply is lost unless the future is awaited"]
pub struct ReplyFuture {
    rx: oneshot::Receiver<Result<Reply>>,
}

impl ReplyFuture {
    fn new(rx: oneshot::Receiver<Result<Reply>>) -> Self {
        Self { rx }
    }

    /// Awaits the reply and treats `not_found` as an error.
    pub async fn value(self) -> Result<Value> {
        self.await?.into_value()
    }

    /// Awaits the reply and treats `not_found` as `None`.
    pub async fn optional(self) -> Result<Option<Value>> {
        Ok(self.await?.into_option())
    }
}

impl Future for ReplyFuture {
    type Output = Result<Reply>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(Error::Abandoned)))
    }
}

/// Handle to an SSDB connection.
///
/// Cloning the handle shares the connection. The connection is closed once
/// [`Client::quit`] is called or every handle has been dropped.
#[derive(Clone)]
pub struct Client {
    requests: mpsc::UnboundedSender<Request>,
    events: broadcast::Sender<ConnectionEvent>,
    stats: Arc<ConnectionStats>,
    config: Arc<ClientConfig>,
}

impl Client {
    /// Creates a client. The server is not contacted until the first
    /// request.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: ClientConfig) -> Self {
        let (transport, transport_events) = TcpTransport::channel(&config);
        let connection = Connection::new(&config, transport);
        let events = connection.event_sender();
        let stats = connection.stats();

        let (requests, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_connection(connection, rx, transport_events));

        Self {
            requests,
            events,
            stats,
            config: Arc::new(config),
        }
    }

    /// Issues any command, known to the command table or not.
    ///
    /// Commands the table does not know have their `ok` payload returned as
    /// a string.
    pub fn call<I>(&self, command: &str, params: I) -> ReplyFuture
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        let (completion, rx) = oneshot::channel();
        let request = Request::Call {
            command: command.to_string(),
            params: params.into_iter().map(|p| p.to_arg()).collect(),
            completion,
        };

        // On failure the completion is dropped with the request, so the
        // future resolves to `Abandoned`
        if self.requests.send(request).is_err() {
            trace!(command = %command, "Connection task is gone");
        }

        ReplyFuture::new(rx)
    }

    /// Starts buffering requests until [`Client::exec`].
    pub fn batch(&self) -> Result<()> {
        self.control(Request::Batch)
    }

    /// Sends every buffered request in a single write.
    pub fn exec(&self) -> Result<()> {
        self.control(Request::Exec)
    }

    /// Closes the connection. Requests still pending are abandoned.
    pub fn quit(&self) -> Result<()> {
        self.control(Request::Quit)
    }

    /// Subscribes to connection and status events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Shared connection statistics.
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// The configuration the client was created with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn control(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| Error::ConnectionClosed)
    }
}

macro_rules! define_client_commands {
    ($($name:ident => $kind:ident),* $(,)?) => {
        /// One method per command in the command table.
        impl Client {
            $(
                #[doc = concat!(
                    "Issues `", stringify!($name), "`. An `ok` reply is coerced as [`",
                    stringify!($kind), "`](crate::commands::ResultKind::", stringify!($kind), ")."
                )]
                pub fn $name<I>(&self, params: I) -> ReplyFuture
                where
                    I: IntoIterator,
                    I::Item: ToArg,
                {
                    self.call(stringify!($name), params)
                }
            )*
        }
    };
}

for_each_command!(define_client_commands);

/// Runs one connection until every client handle is gone.
async fn run_connection(
    mut connection: Connection<TcpTransport>,
    mut requests: mpsc::UnboundedReceiver<Request>,
    mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(Request::Call { command, params, completion }) => {
                    if let Err(e) = connection.send(&command, &params, completion) {
                        debug!(command = %command, error = %e, "Request failed");
                    }
                }
                Some(Request::Batch) => connection.batch(),
                Some(Request::Exec) => {
                    if let Err(e) = connection.exec() {
                        warn!(error = %e, "Pipeline flush failed");
                    }
                }
                Some(Request::Quit) => connection.close(),
                None => {
                    connection.close();
                    break;
                }
            },
            Some(event) = transport_events.recv() => connection.handle_event(event),
        }
    }

    debug!("Connection task finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::protocol::{decode, DecoderState, Response};
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_test::{assert_pending, assert_ready};

    /// Answers a handful of commands from an in-memory map, the way an SSDB
    /// server would.
    fn answer(store: &mut HashMap<Bytes, Bytes>, request: Response) -> Response {
        let (command, params) = request.into_parts();
        match (command.as_str(), params.as_slice()) {
            ("set", [key, value]) => {
                store.insert(key.clone(), value.clone());
                Response::with_status("ok", ["1"])
            }
            ("get", [key]) => match store.get(key) {
                Some(value) => Response::with_status("ok", [value.clone()]),
                None => Response::with_status("not_found", Vec::<Bytes>::new()),
            },
            ("exists", [key]) => {
                let found = if store.contains_key(key) { "1" } else { "0" };
                Response::with_status("ok", [found])
            }
            ("incr", [key, by]) => {
                let current: i64 = store
                    .get(key)
                    .and_then(|v| std::str::from_utf8(v).ok()?.parse().ok())
                    .unwrap_or(0);
                let by: i64 = std::str::from_utf8(by).unwrap().parse().unwrap();
                let next = (current + by).to_string();
                store.insert(key.clone(), Bytes::from(next.clone()));
                Response::with_status("ok", [next])
            }
            ("keys", _) => {
                let mut keys: Vec<Bytes> = store.keys().cloned().collect();
                keys.sort();
                Response::with_status("ok", keys)
            }
            ("echo", _) => Response::with_status("ok", params),
            ("set", _) => Response::with_status("client_error", ["wrong number of arguments"]),
            _ => Response::with_status("error", ["unknown command"]),
        }
    }

    async fn serve(mut stream: TcpStream) {
        let mut store = HashMap::new();
        let mut state = DecoderState::new();
        let mut buf = vec![0u8; 64 * 1024];

        loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };

            let (requests, next) = decode(state, &buf[..n]);
            state = next;

            let mut out = Vec::new();
            for request in requests {
                out.extend_from_slice(&answer(&mut store, request).serialize());
            }
            if stream.write_all(&out).await.is_err() {
                return;
            }
        }
    }

    async fn create_test_server() -> ClientConfig {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream));
            }
        });

        ClientConfig::new(addr.ip().to_string(), addr.port())
    }

    async fn within<F: Future>(future: F) -> F::Output {
        tokio::time::timeout(Duration::from_secs(2), future)
            .await
            .expect("timed out")
    }

    #[tokio::test]
    async fn test_set_get() {
        let client = Client::new(create_test_server().await);

        let reply = within(client.set(["name", "Ariz"])).await.unwrap();
        assert_eq!(reply, Reply::Value(Value::Integer(1)));

        let value = within(client.get(["name"]).value()).await.unwrap();
        assert_eq!(value.as_str(), Some("Ariz"));
    }

    #[tokio::test]
    async fn test_binary_values() {
        let client = Client::new(create_test_server().await);
        let payload: &[u8] = b"line1\nline2\x00\r\n";

        within(client.set(args!["bin", payload])).await.unwrap();
        let value = within(client.get(["bin"]).value()).await.unwrap();
        assert_eq!(value.as_bytes(), Some(payload));
    }

    #[tokio::test]
    async fn test_not_found() {
        let client = Client::new(create_test_server().await);

        let reply = within(client.get(["missing"])).await.unwrap();
        assert!(reply.is_not_found());

        let optional = within(client.get(["missing"]).optional()).await.unwrap();
        assert_eq!(optional, None);

        let err = within(client.get(["missing"]).value()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_boolean_and_list_replies() {
        let client = Client::new(create_test_server().await);

        within(client.set(["a", "1"])).await.unwrap();
        within(client.set(["b", "2"])).await.unwrap();

        let exists = within(client.exists(["a"]).value()).await.unwrap();
        assert_eq!(exists, Value::Boolean(true));
        let exists = within(client.exists(["zzz"]).value()).await.unwrap();
        assert_eq!(exists, Value::Boolean(false));

        let keys = within(client.keys(args!["", "", 10]).value()).await.unwrap();
        assert_eq!(keys, Value::List(vec![Bytes::from("a"), Bytes::from("b")]));
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let client = Client::new(create_test_server().await);

        let err = within(client.set(["only-key"])).await.unwrap_err();
        assert!(matches!(err, Error::Client { ref command } if command == "set"));

        let err = within(client.call("flushdb", args![])).await.unwrap_err();
        assert!(matches!(err, Error::Protocol { ref status, .. } if status == "error"));

        // The connection is still usable afterwards
        let reply = within(client.set(["k", "v"])).await.unwrap();
        assert_eq!(reply.value(), Some(&Value::Integer(1)));
    }

    #[tokio::test]
    async fn test_many_in_flight_resolve_in_order() {
        let client = Client::new(create_test_server().await);

        let futures: Vec<_> = (0..50).map(|_| client.incr(args!["counter", 1])).collect();
        for (i, future) in futures.into_iter().enumerate() {
            let value = within(future.value()).await.unwrap();
            assert_eq!(value, Value::Integer(i as i64 + 1));
        }
    }

    #[tokio::test]
    async fn test_pipeline() {
        let client = Client::new(create_test_server().await);

        client.batch().unwrap();
        let set = client.set(["p", "1"]);
        let incr = client.incr(args!["p", 41]);
        let get = client.get(["p"]);
        client.exec().unwrap();

        assert_eq!(within(set.value()).await.unwrap(), Value::Integer(1));
        assert_eq!(within(incr.value()).await.unwrap(), Value::Integer(42));
        assert_eq!(
            within(get.value()).await.unwrap(),
            Value::String(Bytes::from("42"))
        );

        // batch + exec produced exactly one write for the three requests
        within(client.set(["q", "x"])).await.unwrap();
        assert_eq!(client.stats().pipeline_flushes.load(Ordering::Relaxed), 1);
        assert_eq!(client.stats().requests_sent.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn test_large_pipeline_does_not_stall() {
        let client = Client::new(create_test_server().await);
        let value = Bytes::from(vec![b'x'; 1024 * 1024]);

        // Far more than both socket buffers hold; the server writes its
        // replies before it reads further requests
        client.batch().unwrap();
        let replies: Vec<_> = (0..32)
            .map(|_| client.call("echo", [value.clone()]))
            .collect();
        client.exec().unwrap();

        tokio::time::timeout(Duration::from_secs(30), async {
            for reply in replies {
                let echoed = reply.value().await.unwrap();
                assert_eq!(echoed.as_bytes(), Some(&value[..]));
            }
        })
        .await
        .expect("pipeline stalled");

        assert_eq!(client.stats().pipeline_flushes.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_batched_requests_wait_for_exec() {
        let client = Client::new(create_test_server().await);

        client.batch().unwrap();
        let mut set = tokio_test::task::spawn(client.set(["w", "1"]));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_pending!(set.poll());

        client.exec().unwrap();
        within(async {
            while !set.is_woken() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        let reply = assert_ready!(set.poll()).unwrap();
        assert_eq!(reply, Reply::Value(Value::Integer(1)));
    }

    #[tokio::test]
    async fn test_events() {
        let client = Client::new(create_test_server().await);
        let mut events = client.subscribe();

        within(client.set(["e", "1"])).await.unwrap();
        within(client.get(["nope"])).await.unwrap();

        assert!(matches!(within(events.recv()).await, Ok(ConnectionEvent::Connect)));
        assert!(matches!(
            within(events.recv()).await,
            Ok(ConnectionEvent::StatusOk { ref command, .. }) if command == "set"
        ));
        assert!(matches!(
            within(events.recv()).await,
            Ok(ConnectionEvent::StatusNotFound { .. })
        ));

        client.quit().unwrap();
        assert!(matches!(
            within(events.recv()).await,
            Ok(ConnectionEvent::StatusNotOk { .. })
        ));
        assert!(matches!(within(events.recv()).await, Ok(ConnectionEvent::Close)));
    }

    #[tokio::test]
    async fn test_quit_is_final() {
        let client = Client::new(create_test_server().await);
        within(client.set(["k", "v"])).await.unwrap();

        client.quit().unwrap();
        let err = within(client.get(["k"])).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = Client::new(ClientConfig::new("127.0.0.1", port));
        let mut events = client.subscribe();
        let reply = client.get(["k"]);

        assert!(matches!(within(events.recv()).await, Ok(ConnectionEvent::Error(_))));
        assert!(matches!(within(events.recv()).await, Ok(ConnectionEvent::Close)));
        assert!(matches!(within(reply).await, Err(Error::Abandoned)));
    }

    #[test]
    fn test_reply_future_abandoned_when_sender_dropped() {
        let (tx, rx) = oneshot::channel();
        let mut future = tokio_test::task::spawn(ReplyFuture::new(rx));

        assert_pending!(future.poll());
        drop(tx);
        assert!(future.is_woken());
        assert!(matches!(assert_ready!(future.poll()), Err(Error::Abandoned)));
    }
}
