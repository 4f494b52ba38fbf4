//! WebSocket connection and dispatch loop.
//!
//! This module owns the single WebSocket to the gateway, including
//! request/response correlation and event routing.
//!
//! # Dispatch Loop
//!
//! The connection spawns one tokio task that reads frames in arrival
//! order and classifies each one:
//!
//! - `transaction` present and registered: resolve the pending request
//! - `transaction` present but unknown: routing anomaly, dropped
//! - no `transaction`: hand to the event handler for session routing
//!
//! Writes do not go through the loop. `send` registers the transaction
//! first and then writes under the writer lock, so a reply can never
//! arrive before its entry exists.
//!
//! When the loop ends, every outstanding request is failed: with
//! [`Error::ConnectionClosed`] after shutdown or a remote close, with
//! [`Error::Connection`] after a read failure.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::to_string;
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result, RoutingAnomaly};
use crate::identifiers::TransactionId;
use crate::protocol::{Frame, Request};

use super::millis;
use super::pending::{self, CorrelationMap, PendingRequest, SharedCorrelation};

// ============================================================================
// Types
// ============================================================================

/// WebSocket stream produced by `connect_async`.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the WebSocket.
type WsSink = SplitSink<WsStream, Message>;

/// Read half of the WebSocket.
type WsSource = SplitStream<WsStream>;

/// Event handler callback type.
///
/// Called on the dispatch task for each frame without a `transaction`.
/// Return an anomaly when the frame cannot be attributed.
pub type EventHandler = Box<dyn Fn(Frame) -> std::result::Result<(), RoutingAnomaly> + Send + Sync>;

/// Why the dispatch loop stopped.
enum Termination {
    /// `shutdown` was called or the connection was dropped.
    Requested,
    /// The gateway closed the socket.
    Closed,
    /// Reading failed.
    Failed(String),
}

impl Termination {
    fn error(&self) -> Error {
        match self {
            Self::Requested | Self::Closed => Error::ConnectionClosed,
            Self::Failed(message) => Error::connection(message.clone()),
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// WebSocket connection to a Janus gateway.
///
/// Handles request/response correlation and hands asynchronous events
/// to an [`EventHandler`]. The connection spawns an internal dispatch
/// task that lives until [`shutdown`](Self::shutdown), a transport
/// failure, or drop.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync`; share it behind an `Arc`.
pub struct Connection {
    /// Write half, serialized across senders.
    writer: AsyncMutex<WsSink>,
    /// Transaction table (shared with the dispatch loop).
    correlation: SharedCorrelation,
    /// Cleared when the dispatch loop exits.
    alive: Arc<AtomicBool>,
    /// Frames dropped as routing anomalies.
    anomalies: Arc<AtomicU64>,
    /// Cooperative stop signal for the dispatch loop.
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    /// Dispatch task, awaited on shutdown.
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Opens a WebSocket to `uri` negotiating `subprotocol`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `subprotocol` is not a valid header value
    /// - [`Error::ConnectionTimeout`] if the handshake exceeds `connect_timeout`
    /// - [`Error::Connection`] if the handshake fails
    pub async fn open(
        uri: &Url,
        subprotocol: &str,
        connect_timeout: Duration,
        handler: EventHandler,
    ) -> Result<Self> {
        let mut request = uri.as_str().into_client_request()?;
        let protocol = HeaderValue::from_str(subprotocol)
            .map_err(|e| Error::config(format!("Invalid subprotocol {subprotocol:?}: {e}")))?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);

        let (ws_stream, response) = timeout(connect_timeout, connect_async(request))
            .await
            .map_err(|_| Error::connection_timeout(millis(connect_timeout)))?
            .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

        debug!(status = %response.status(), "WebSocket handshake completed");
        info!(%uri, "Connected to gateway");

        Ok(Self::new(ws_stream, handler))
    }

    /// Creates a connection from an established stream.
    ///
    /// Spawns the dispatch loop task internally.
    fn new(ws_stream: WsStream, handler: EventHandler) -> Self {
        let (ws_write, ws_read) = ws_stream.split();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let correlation: SharedCorrelation = Arc::new(Mutex::new(CorrelationMap::default()));
        let alive = Arc::new(AtomicBool::new(true));
        let anomalies = Arc::new(AtomicU64::new(0));

        let dispatch = tokio::spawn(Self::run_dispatch_loop(
            ws_read,
            shutdown_rx,
            Arc::clone(&correlation),
            handler,
            Arc::clone(&alive),
            Arc::clone(&anomalies),
        ));

        Self {
            writer: AsyncMutex::new(ws_write),
            correlation,
            alive,
            anomalies,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            dispatch: Mutex::new(Some(dispatch)),
        }
    }

    /// Stamps `request` with a fresh transaction, registers it and writes it.
    ///
    /// Returns the caller half of the correlation record; every wait on it
    /// is bounded by `request_timeout`.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the dispatch loop has stopped
    /// - [`Error::Json`] if the request cannot be serialized
    /// - [`Error::Connection`] if the write fails
    pub async fn send(
        &self,
        mut request: Request,
        ack_only: bool,
        request_timeout: Duration,
    ) -> Result<PendingRequest> {
        if !self.is_alive() {
            return Err(Error::ConnectionClosed);
        }

        let transaction = TransactionId::generate();
        request.stamp(transaction.clone());
        let json = to_string(&request)?;

        // Register before writing so the reply always finds its entry
        let pending = Self::register_live(
            &self.correlation,
            &self.alive,
            transaction.clone(),
            ack_only,
            request_timeout,
        )?;

        let written = self.writer.lock().await.send(Message::Text(json.into())).await;
        if let Err(e) = written {
            self.correlation.lock().remove(&transaction);
            warn!(%transaction, error = %e, "Failed to write request");
            return Err(Error::connection(e.to_string()));
        }

        trace!(%transaction, janus = request.command.name(), ack_only, "Request sent");
        Ok(pending)
    }

    /// Returns `true` while the dispatch loop is running.
    #[inline]
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Returns the number of outstanding transactions.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Returns the number of frames dropped as routing anomalies.
    #[inline]
    #[must_use]
    pub fn anomaly_count(&self) -> u64 {
        self.anomalies.load(Ordering::Relaxed)
    }

    /// Stops the dispatch loop, waits for it to exit, then closes the socket.
    ///
    /// Outstanding requests fail with [`Error::ConnectionClosed`].
    /// Calling this more than once is harmless.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }

        let dispatch = self.dispatch.lock().take();
        if let Some(dispatch) = dispatch
            && let Err(e) = dispatch.await
        {
            debug!(error = %e, "Dispatch task ended abnormally");
        }

        if let Err(e) = self.writer.lock().await.close().await {
            debug!(error = %e, "Close handshake failed");
        }

        info!("Connection closed");
    }

    /// Dispatch loop that reads frames until stopped.
    async fn run_dispatch_loop(
        mut ws_read: WsSource,
        mut shutdown_rx: oneshot::Receiver<()>,
        correlation: SharedCorrelation,
        handler: EventHandler,
        alive: Arc<AtomicBool>,
        anomalies: Arc<AtomicU64>,
    ) {
        let termination = loop {
            tokio::select! {
                // Sender dropped counts as a request too
                _ = &mut shutdown_rx => {
                    debug!("Shutdown requested");
                    break Termination::Requested;
                }

                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(anomaly) =
                                Self::handle_incoming_message(&text, &correlation, &handler)
                            {
                                anomalies.fetch_add(1, Ordering::Relaxed);
                                warn!(%anomaly, "Dropped unroutable frame");
                            }
                        }

                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "WebSocket closed by remote");
                            break Termination::Closed;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break Termination::Failed(e.to_string());
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break Termination::Closed;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }
            }
        };

        Self::fail_pending_requests(&correlation, &alive, &termination);

        debug!("Dispatch loop terminated");
    }

    /// Classifies one text frame and routes it.
    fn handle_incoming_message(
        text: &str,
        correlation: &Mutex<CorrelationMap>,
        handler: &EventHandler,
    ) -> std::result::Result<(), RoutingAnomaly> {
        let frame = Frame::parse(text).map_err(|e| RoutingAnomaly::Malformed {
            reason: e.to_string(),
        })?;

        trace!(janus = frame.kind(), transaction = ?frame.transaction(), "Frame received");

        match frame.transaction().cloned() {
            Some(transaction) => pending::resolve(correlation, &transaction, frame),
            None => handler(frame),
        }
    }

    /// Registers `transaction` unless the dispatch loop has stopped.
    ///
    /// An entry inserted after the final drain would never be failed, so
    /// liveness is checked again once the entry is in the table.
    fn register_live(
        correlation: &SharedCorrelation,
        alive: &AtomicBool,
        transaction: TransactionId,
        ack_only: bool,
        request_timeout: Duration,
    ) -> Result<PendingRequest> {
        let pending =
            PendingRequest::register(correlation, transaction.clone(), ack_only, request_timeout);

        if !alive.load(Ordering::Acquire) {
            correlation.lock().remove(&transaction);
            return Err(Error::ConnectionClosed);
        }

        Ok(pending)
    }

    /// Marks the connection dead and fails all pending requests.
    ///
    /// Both happen under the table lock so `register_live` either sees the
    /// flag cleared or has its entry drained here.
    fn fail_pending_requests(
        correlation: &Mutex<CorrelationMap>,
        alive: &AtomicBool,
        termination: &Termination,
    ) {
        let pending: Vec<_> = {
            let mut table = correlation.lock();
            alive.store(false, Ordering::Release);
            table.drain().collect()
        };
        let count = pending.len();

        for (_, entry) in pending {
            entry.fail(termination.error());
        }

        if count > 0 {
            debug!(count, "Failed pending requests on shutdown");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
