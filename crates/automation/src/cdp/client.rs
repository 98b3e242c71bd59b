//! CDP transport - the core communication layer
//!
//! Design decisions:
//! 1. Single WebSocket per connection; sessions multiplex over it
//! 2. Commands matched to replies by id via oneshot channels, no locks on
//!    the receive path
//! 3. Events fan out to broadcast subscribers; dropping a receiver
//!    unsubscribes
//! 4. Socket loss fails every in-flight command exactly once, with a
//!    connection-lost error

use dashmap::DashMap;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use super::protocol::{CdpEvent, CdpMessage, CdpRequest, CdpResponse, CommandId, SessionId};
use crate::error::{AutomationError, Result};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Transport handle over one DevTools WebSocket connection.
pub struct CdpClient {
    /// Monotonic command id counter
    next_id: AtomicU64,

    /// Commands awaiting a reply, keyed by id. Exactly one resolution per
    /// entry: reply, local timeout, or bulk failure on close.
    pending: DashMap<CommandId, oneshot::Sender<CdpResponse>>,

    /// Event fan-out, keyed by method name
    subscribers: DashMap<String, broadcast::Sender<CdpEvent>>,

    /// Write half, wrapped for concurrent senders
    ws_sink: RwLock<WsSink>,

    closed: AtomicBool,

    /// Per-command deadline when the caller does not supply one
    default_timeout: Duration,
}

impl CdpClient {
    /// Connect to a DevTools WebSocket endpoint and start the reader task.
    pub async fn connect(ws_url: &str, default_timeout: Duration) -> Result<Arc<Self>> {
        debug!(url = ws_url, "connecting to DevTools websocket");
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (sink, mut stream) = ws_stream.split();

        let client = Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            subscribers: DashMap::new(),
            ws_sink: RwLock::new(sink),
            closed: AtomicBool::new(false),
            default_timeout,
        });

        let reader = Arc::clone(&client);
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => reader.handle_frame(&text),
                    Ok(Message::Close(_)) => {
                        debug!("websocket closed by peer");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "websocket read failed");
                        break;
                    }
                }
            }
            reader.mark_closed();
        });

        Ok(client)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a command and await its reply, using the default timeout.
    pub async fn send(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        session_id: Option<SessionId>,
    ) -> Result<Value> {
        self.send_with_timeout(method, params, session_id, self.default_timeout)
            .await
    }

    /// Send a command and await its reply within `timeout`. On expiry the
    /// command is forgotten locally; a late reply finds no pending entry and
    /// is discarded.
    pub async fn send_with_timeout(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        session_id: Option<SessionId>,
        timeout: Duration,
    ) -> Result<Value> {
        if self.is_closed() {
            return Err(AutomationError::ConnectionLost(
                "send after close".to_string(),
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = CdpRequest {
            id,
            method: method.into(),
            params,
            session_id,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        // close() may have drained the map between the guard above and the
        // insert; a stranded entry would surface as a timeout instead of
        // connection-lost.
        if self.is_closed() {
            self.pending.remove(&id);
            return Err(AutomationError::ConnectionLost(
                "send after close".to_string(),
            ));
        }

        let json = serde_json::to_string(&request)?;
        {
            let mut sink = self.ws_sink.write().await;
            if let Err(e) = sink.send(Message::Text(json)).await {
                self.pending.remove(&id);
                if self.is_closed() {
                    return Err(AutomationError::ConnectionLost(e.to_string()));
                }
                return Err(e.into());
            }
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                // Sender dropped: the connection went away mid-flight.
                return Err(AutomationError::ConnectionLost(
                    "connection closed while awaiting reply".to_string(),
                ));
            }
            Err(_) => {
                self.pending.remove(&id);
                return Err(AutomationError::Timeout(timeout));
            }
        };

        if let Some(error) = response.error {
            return Err(AutomationError::Protocol {
                code: error.code,
                message: error.message,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Event stream for `method`. Dropping the receiver unsubscribes;
    /// closing the connection terminates every stream.
    pub fn subscribe(&self, method: impl Into<String>) -> broadcast::Receiver<CdpEvent> {
        self.subscribers
            .entry(method.into())
            .or_insert_with(|| broadcast::channel(EVENT_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    fn handle_frame(&self, text: &str) {
        let msg: CdpMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };

        match msg {
            CdpMessage::Response(response) => match self.pending.remove(&response.id) {
                Some((_, tx)) => {
                    let _ = tx.send(response);
                }
                // Timed out locally or already resolved; nothing to do.
                None => trace!(id = response.id, "discarding reply for unknown command"),
            },
            CdpMessage::Event(event) => {
                if let Some(tx) = self.subscribers.get(&event.method) {
                    let _ = tx.send(event);
                }
            }
        }
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Dropping the senders resolves every awaiting caller with a
        // connection-lost error and ends all event streams.
        self.pending.clear();
        self.subscribers.clear();
    }

    /// Close the connection. Outstanding commands fail with connection-lost;
    /// subsequent sends fail immediately.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut sink = self.ws_sink.write().await;
        if let Err(e) = sink.close().await {
            debug!(error = %e, "websocket close handshake failed");
        }
        drop(sink);
        self.pending.clear();
        self.subscribers.clear();
    }
}
