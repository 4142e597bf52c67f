//! Duplex JSON-RPC 2.0 endpoint over a pair of framed byte streams.
//!
//! Two pump tasks own the streams: the writer drains a bounded queue of
//! outgoing frames, the reader classifies incoming frames and routes them —
//! responses to the pending-request table, server-initiated requests to an
//! automatic "method not found" reply, notifications to subscribers. The
//! only ordering assumed is JSON-RPC's own: responses correlate by id, and
//! a response may race an unrelated notification.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::codec::{MessageReader, MessageWriter};
use crate::protocol::{Notification, Request};

const WRITE_QUEUE_CAPACITY: usize = 64;

const SUBSCRIPTION_QUEUE_CAPACITY: usize = 64;

enum Outgoing {
    Message {
        frame: serde_json::Value,
        /// Resolved once the frame is on the wire, for flush-before-return
        /// notification semantics.
        written: Option<oneshot::Sender<()>>,
    },
    Close,
}

enum Incoming {
    Response {
        id: u64,
        body: serde_json::Value,
    },
    ServerRequest {
        id: serde_json::Value,
        method: String,
    },
    Notification {
        method: String,
        params: serde_json::Value,
    },
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>>;
type SubscriberMap = Arc<Mutex<HashMap<String, Vec<mpsc::Sender<serde_json::Value>>>>>;

fn classify(mut frame: serde_json::Value) -> Option<Incoming> {
    let id = frame.get("id").cloned();
    let method = frame
        .get("method")
        .and_then(serde_json::Value::as_str)
        .map(String::from);
    let is_reply = frame.get("result").is_some() || frame.get("error").is_some();

    match (id, method, is_reply) {
        (Some(id), None, true) => Some(Incoming::Response {
            id: id.as_u64()?,
            body: frame,
        }),
        (Some(id), Some(method), _) => Some(Incoming::ServerRequest { id, method }),
        (None, Some(method), _) => {
            let params = frame
                .get_mut("params")
                .map(serde_json::Value::take)
                .unwrap_or(serde_json::Value::Null);
            Some(Incoming::Notification { method, params })
        }
        _ => None,
    }
}

async fn dispatch(
    frame: serde_json::Value,
    pending: &Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>,
    subscribers: &Mutex<HashMap<String, Vec<mpsc::Sender<serde_json::Value>>>>,
    writer_tx: &mpsc::Sender<Outgoing>,
) {
    let Some(incoming) = classify(frame) else {
        tracing::trace!("ignoring malformed JSON-RPC frame");
        return;
    };

    match incoming {
        Incoming::Response { id, body } => {
            let waiter = pending.lock().await.remove(&id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(body);
                }
                None => tracing::trace!(id, "response with no waiting request"),
            }
        }
        Incoming::ServerRequest { id, method } => {
            // Servers block on unanswered requests (workspace/configuration,
            // client/registerCapability), so always reply.
            tracing::debug!(%method, "declining server request");
            let reply = serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {
                    "code": -32601,
                    "message": format!("Method not found: {method}")
                }
            });
            let _ = writer_tx
                .send(Outgoing::Message {
                    frame: reply,
                    written: None,
                })
                .await;
        }
        Incoming::Notification { method, params } => {
            let mut map = subscribers.lock().await;
            let Some(queue) = map.get_mut(&method) else {
                tracing::trace!(%method, "no subscriber for notification");
                return;
            };
            queue.retain(|tx| match tx.try_send(params.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(%method, "subscriber queue full, dropping notification");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
        }
    }
}

/// One side of a JSON-RPC conversation.
///
/// Built from any read/write stream pair — a child process's stdout/stdin
/// in production, an in-memory pipe in tests.
pub struct Endpoint {
    writer_tx: mpsc::Sender<Outgoing>,
    pending: PendingMap,
    subscribers: SubscriberMap,
    next_id: u64,
    request_timeout: Duration,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl Endpoint {
    pub fn new<R, W>(incoming: R, outgoing: W, request_timeout: Duration) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending = PendingMap::default();
        let subscribers = SubscriberMap::default();
        let (writer_tx, mut writer_rx) = mpsc::channel::<Outgoing>(WRITE_QUEUE_CAPACITY);

        let writer_task = tokio::spawn(async move {
            let mut writer = MessageWriter::new(outgoing);
            while let Some(command) = writer_rx.recv().await {
                match command {
                    Outgoing::Message { frame, written } => {
                        if let Err(e) = writer.write_message(&frame).await {
                            tracing::warn!("write to language server failed: {e:#}");
                            break;
                        }
                        if let Some(tx) = written {
                            let _ = tx.send(());
                        }
                    }
                    Outgoing::Close => break,
                }
            }
        });

        let reader_pending = pending.clone();
        let reader_subscribers = subscribers.clone();
        let reader_writer_tx = writer_tx.clone();
        let reader_task = tokio::spawn(async move {
            let mut reader = MessageReader::new(incoming);
            loop {
                match reader.read_message().await {
                    Ok(Some(frame)) => {
                        dispatch(
                            frame,
                            &reader_pending,
                            &reader_subscribers,
                            &reader_writer_tx,
                        )
                        .await;
                    }
                    Ok(None) => {
                        tracing::debug!("language server closed its output stream");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("reading from language server failed: {e:#}");
                        break;
                    }
                }
            }
            // Dropping the senders wakes every waiter with a closed-channel
            // error instead of leaving them parked until their deadline.
            reader_pending.lock().await.clear();
            reader_subscribers.lock().await.clear();
        });

        Self {
            writer_tx,
            pending,
            subscribers,
            next_id: 1,
            request_timeout,
            reader_task,
            writer_task,
        }
    }

    /// Send a request and await the correlated response, bounded by the
    /// endpoint's request deadline.
    ///
    /// A JSON-RPC error response surfaces as `Err`; otherwise the `result`
    /// payload is returned.
    pub async fn request(
        &mut self,
        method: &'static str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let frame =
            serde_json::to_value(Request::new(id, method, params)).context("encoding request")?;
        if self
            .writer_tx
            .send(Outgoing::Message {
                frame,
                written: None,
            })
            .await
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            bail!("connection to the language server is closed");
        }

        let mut body = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(body)) => body,
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&id);
                bail!("connection closed before the {method} response arrived");
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                bail!("{method} request timed out");
            }
        };

        if let Some(error) = body.get("error") {
            let code = error
                .get("code")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or_default();
            let message = error
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown error");
            bail!("{method} failed with code {code}: {message}");
        }

        Ok(body
            .get_mut("result")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }

    /// Send a notification. Returns once the frame has been written and
    /// flushed, so a follow-up wait cannot outrun it.
    pub async fn notify(
        &self,
        method: &'static str,
        params: Option<serde_json::Value>,
    ) -> Result<()> {
        let frame = serde_json::to_value(Notification::new(method, params))
            .context("encoding notification")?;
        let (tx, rx) = oneshot::channel();
        self.writer_tx
            .send(Outgoing::Message {
                frame,
                written: Some(tx),
            })
            .await
            .map_err(|_| anyhow::anyhow!("connection to the language server is closed"))?;
        rx.await
            .map_err(|_| anyhow::anyhow!("connection closed before {method} was written"))?;
        Ok(())
    }

    /// Subscribe to every future occurrence of a server notification.
    ///
    /// The returned queue buffers until read; occurrences that arrive while
    /// nobody is subscribed to the method are dropped.
    pub async fn subscribe(&self, method: &str) -> mpsc::Receiver<serde_json::Value> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_QUEUE_CAPACITY);
        self.subscribers
            .lock()
            .await
            .entry(method.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Stop both pump tasks. Pending requests fail, the streams drop.
    pub async fn close(self) {
        let _ = self.writer_tx.send(Outgoing::Close).await;
        let _ = self.writer_task.await;
        self.reader_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    type ServerReader = MessageReader<ReadHalf<DuplexStream>>;
    type ServerWriter = MessageWriter<WriteHalf<DuplexStream>>;

    fn pair(request_timeout: Duration) -> (Endpoint, ServerReader, ServerWriter) {
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_side);
        let (server_read, server_write) = tokio::io::split(server_side);
        (
            Endpoint::new(client_read, client_write, request_timeout),
            MessageReader::new(server_read),
            MessageWriter::new(server_write),
        )
    }

    #[tokio::test]
    async fn request_gets_the_correlated_result() {
        let (mut endpoint, mut server_rx, mut server_tx) = pair(Duration::from_secs(5));

        let server = tokio::spawn(async move {
            let request = server_rx.read_message().await.unwrap().unwrap();
            assert_eq!(request["method"], "initialize");
            let id = request["id"].clone();
            server_tx
                .write_message(&serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": { "capabilities": {} }
                }))
                .await
                .unwrap();
        });

        let result = endpoint
            .request("initialize", Some(serde_json::json!({})))
            .await
            .unwrap();
        assert!(result["capabilities"].is_object());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn error_response_surfaces_as_err() {
        let (mut endpoint, mut server_rx, mut server_tx) = pair(Duration::from_secs(5));

        let server = tokio::spawn(async move {
            let request = server_rx.read_message().await.unwrap().unwrap();
            let id = request["id"].clone();
            server_tx
                .write_message(&serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32603, "message": "internal error" }
                }))
                .await
                .unwrap();
        });

        let err = endpoint.request("shutdown", None).await.unwrap_err();
        assert!(err.to_string().contains("internal error"), "{err}");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unanswered_request_hits_the_deadline() {
        let (mut endpoint, _server_rx, _server_tx) = pair(Duration::from_millis(50));

        let err = endpoint.request("initialize", None).await.unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");
        assert!(endpoint.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn notification_reaches_its_subscriber() {
        let (endpoint, _server_rx, mut server_tx) = pair(Duration::from_secs(5));

        let mut diagnostics = endpoint.subscribe("textDocument/publishDiagnostics").await;
        server_tx
            .write_message(&serde_json::json!({
                "jsonrpc": "2.0",
                "method": "textDocument/publishDiagnostics",
                "params": { "uri": "file:///a.ts", "diagnostics": [] }
            }))
            .await
            .unwrap();

        let params = diagnostics.recv().await.unwrap();
        assert_eq!(params["uri"], "file:///a.ts");
    }

    #[tokio::test]
    async fn unsubscribed_notifications_are_dropped_quietly() {
        let (endpoint, _server_rx, mut server_tx) = pair(Duration::from_secs(5));

        server_tx
            .write_message(&serde_json::json!({
                "jsonrpc": "2.0",
                "method": "telemetry/event",
                "params": {}
            }))
            .await
            .unwrap();

        // The endpoint must still be usable afterwards.
        let mut logs = endpoint.subscribe("window/logMessage").await;
        server_tx
            .write_message(&serde_json::json!({
                "jsonrpc": "2.0",
                "method": "window/logMessage",
                "params": { "type": 3, "message": "hi" }
            }))
            .await
            .unwrap();
        assert_eq!(logs.recv().await.unwrap()["message"], "hi");
    }

    #[tokio::test]
    async fn server_requests_are_declined() {
        let (_endpoint, mut server_rx, mut server_tx) = pair(Duration::from_secs(5));

        server_tx
            .write_message(&serde_json::json!({
                "jsonrpc": "2.0",
                "id": 9,
                "method": "workspace/configuration",
                "params": { "items": [] }
            }))
            .await
            .unwrap();

        let reply = server_rx.read_message().await.unwrap().unwrap();
        assert_eq!(reply["id"], 9);
        assert_eq!(reply["error"]["code"], -32601);
        assert!(
            reply["error"]["message"]
                .as_str()
                .unwrap()
                .contains("workspace/configuration")
        );
    }

    #[tokio::test]
    async fn notify_is_flushed_before_returning() {
        let (endpoint, mut server_rx, _server_tx) = pair(Duration::from_secs(5));

        endpoint
            .notify(
                "textDocument/didOpen",
                Some(serde_json::json!({"textDocument": {"uri": "file:///a.ts"}})),
            )
            .await
            .unwrap();

        // The frame is already on the wire by the time notify returned.
        let frame = server_rx.read_message().await.unwrap().unwrap();
        assert_eq!(frame["method"], "textDocument/didOpen");
        assert!(frame.get("id").is_none());
    }

    #[tokio::test]
    async fn closed_peer_fails_requests() {
        let (mut endpoint, server_rx, server_tx) = pair(Duration::from_millis(200));
        drop(server_rx);
        drop(server_tx);

        assert!(endpoint.request("initialize", None).await.is_err());
    }

    #[tokio::test]
    async fn response_with_unknown_id_is_ignored() {
        let pending = PendingMap::default();
        let subscribers = SubscriberMap::default();
        let (writer_tx, mut writer_rx) = mpsc::channel(4);

        dispatch(
            serde_json::json!({"jsonrpc": "2.0", "id": 41, "result": {}}),
            &pending,
            &subscribers,
            &writer_tx,
        )
        .await;

        assert!(pending.lock().await.is_empty());
        assert!(writer_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn response_routes_to_the_matching_waiter() {
        let pending = PendingMap::default();
        let subscribers = SubscriberMap::default();
        let (writer_tx, _writer_rx) = mpsc::channel(4);

        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(7, tx);

        dispatch(
            serde_json::json!({"jsonrpc": "2.0", "id": 7, "result": {"ok": true}}),
            &pending,
            &subscribers,
            &writer_tx,
        )
        .await;

        let body = rx.await.unwrap();
        assert_eq!(body["result"]["ok"], true);
        assert!(pending.lock().await.is_empty());
    }
}
