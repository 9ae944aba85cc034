//! RPC session — request/response correlation over one transport.
//!
//! A single background reader task owns the read half of the transport.
//! Every incoming frame is classified and dispatched:
//!
//! - **Response** → the `oneshot` registered by [`RpcSession::request`]
//! - **Server request** → answered inline (`ping` gets `{}`, anything else
//!   gets "method not found")
//! - **Notification** → the `mpsc` channel returned by [`RpcSession::start`]
//!
//! When the reader stops (peer hangup, I/O error, or [`RpcSession::close`]),
//! the `closed` token is cancelled and all pending requests fail with
//! [`ConnectionError::Closed`].

use super::connector::Transport;
use super::error::{ConnectionError, Result};
use crate::protocol::framing::{read_frame, write_frame};
use crate::protocol::messages::{
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, JsonRpcResponseOut, METHOD_NOT_FOUND,
    methods,
};
use crate::protocol::transport::{MessageKind, classify_message};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter};
use tokio::process::Child;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, trace, warn};

type Writer = Arc<Mutex<BufWriter<Box<dyn AsyncWrite + Send + Unpin>>>>;
type PendingMap = Arc<std::sync::Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

pub struct RpcSession {
    /// Writer (serialized writes, independent of reader).
    writer: Writer,
    /// Request-response correlation (request_id -> oneshot sender).
    ///
    /// `std::sync::Mutex` so that an abandoned request can deregister itself
    /// from `Drop`.
    pending: PendingMap,
    closed: CancellationToken,
    _reader_handle: JoinHandle<()>,
    /// Child process for `stdio:` endpoints (killed on close/drop).
    child: std::sync::Mutex<Option<Child>>,
}

impl RpcSession {
    /// Take ownership of a transport and start the background reader.
    pub fn start(transport: Transport) -> (Arc<Self>, mpsc::UnboundedReceiver<JsonRpcNotification>) {
        let Transport {
            reader,
            writer,
            child,
        } = transport;

        let writer: Writer = Arc::new(Mutex::new(BufWriter::new(writer)));
        let pending: PendingMap = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let closed = CancellationToken::new();
        let (notification_tx, notification_rx) = mpsc::unbounded_channel();

        let reader_handle = tokio::spawn(Self::reader_loop(
            reader,
            Arc::clone(&pending),
            Arc::clone(&writer),
            notification_tx,
            closed.clone(),
        ));

        let session = Arc::new(Self {
            writer,
            pending,
            closed,
            _reader_handle: reader_handle,
            child: std::sync::Mutex::new(child),
        });
        (session, notification_rx)
    }

    /// Send a request and wait for the matching response.
    ///
    /// Cancel-safe: dropping the returned future removes the pending entry.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }

        let request = JsonRpcRequest::new(method, params);
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(request.id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id: request.id,
        };

        self.send(&request).await?;

        let response = tokio::select! {
            response = rx => response.map_err(|_| ConnectionError::Closed)?,
            _ = self.closed.cancelled() => return Err(ConnectionError::Closed),
        };

        if let Some(error) = response.error {
            return Err(ConnectionError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        self.send(&JsonRpcNotification::new(method, params)).await
    }

    /// Resolves once the session can no longer carry requests.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Stop the reader, fail pending requests and kill a child process.
    pub fn close(&self) {
        self.closed.cancel();
        let mut child = self.child.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(child) = child.as_mut() {
            let _ = child.start_kill();
        }
    }

    fn lock_pending(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<JsonRpcResponse>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn send<T: Serialize>(&self, message: &T) -> Result<()> {
        let body = serde_json::to_vec(message)?;
        trace!(body = %String::from_utf8_lossy(&body), "Session sending");

        let mut writer = self.writer.lock().await;
        if let Err(e) = write_frame(&mut *writer, &body).await {
            if e.is_fatal() {
                self.closed.cancel();
            }
            return Err(e);
        }
        Ok(())
    }

    /// Background reader loop — single owner of the read half.
    async fn reader_loop(
        reader: Box<dyn AsyncRead + Send + Unpin>,
        pending: PendingMap,
        writer: Writer,
        notifications: mpsc::UnboundedSender<JsonRpcNotification>,
        closed: CancellationToken,
    ) {
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            let body = tokio::select! {
                _ = closed.cancelled() => break,
                frame = read_frame(&mut reader, &mut line) => match frame {
                    Ok(Some(body)) => body,
                    Ok(None) => {
                        debug!("Session: peer closed the stream");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Session: failed to read frame");
                        break;
                    }
                },
            };

            let json: Value = match serde_json::from_slice(&body) {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "Session: discarding malformed frame");
                    continue;
                }
            };
            trace!(message = %json, "Session received");

            match classify_message(&json) {
                MessageKind::Response { id } => {
                    let response: JsonRpcResponse = match serde_json::from_value(json) {
                        Ok(r) => r,
                        Err(e) => {
                            warn!(id, error = %e, "Session: malformed response");
                            continue;
                        }
                    };
                    let waiter = pending
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&id);
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(response);
                        }
                        None => debug!(id, "Session: response for abandoned request"),
                    }
                }
                MessageKind::IncomingRequest { id } => {
                    let method = json.get("method").and_then(|m| m.as_str()).unwrap_or("");
                    let reply = if method == methods::PING {
                        JsonRpcResponseOut::result(id, serde_json::json!({}))
                    } else {
                        debug!(method, "Session: rejecting unsupported server request");
                        JsonRpcResponseOut::error(
                            id,
                            METHOD_NOT_FOUND,
                            format!("method not found: {}", method),
                        )
                    };
                    let written = match serde_json::to_vec(&reply) {
                        Ok(body) => {
                            let mut w = writer.lock().await;
                            write_frame(&mut *w, &body).await
                        }
                        Err(e) => Err(e.into()),
                    };
                    if let Err(e) = written {
                        warn!(error = %e, "Session: failed to answer server request");
                        if e.is_fatal() {
                            break;
                        }
                    }
                }
                MessageKind::Notification => {
                    match serde_json::from_value::<JsonRpcNotification>(json) {
                        Ok(notification) => {
                            let _ = notifications.send(notification);
                        }
                        Err(e) => debug!(error = %e, "Session: malformed notification"),
                    }
                }
                MessageKind::Invalid => {
                    debug!(message = %json, "Session: ignoring unclassifiable message");
                }
            }
        }

        // Reader ended — fail every waiter
        debug!("Session: reader loop ended");
        closed.cancel();
        pending.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Drop for RpcSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Deregisters a request that was abandoned (timeout or caller dropped).
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}
