//! Gateway client.
//!
//! A [`Client`] owns one WebSocket connection and the table of sessions
//! created over it. Frames without a transaction are routed here: by
//! `session_id` to a [`Session`], which routes further by `sender`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result, RoutingAnomaly};
use crate::identifiers::SessionId;
use crate::protocol::frame::allocated_id;
use crate::protocol::{Command, Frame, Request};
use crate::session::Session;
use crate::transport::{Connection, EventHandler, PendingRequest, millis};

use super::builder::ClientBuilder;
use super::options::ClientOptions;

// ============================================================================
// ClientInner
// ============================================================================

/// Shared state behind every [`Client`] clone.
pub(crate) struct ClientInner {
    /// Gateway URI.
    uri: Url,
    /// Connection options.
    options: ClientOptions,
    /// Active connection, `None` before `connect` and after `disconnect`.
    connection: RwLock<Option<Arc<Connection>>>,
    /// Sessions keyed by server-assigned id.
    sessions: Mutex<FxHashMap<SessionId, Session>>,
}

impl ClientInner {
    /// Returns the live connection.
    fn connection(&self) -> Result<Arc<Connection>> {
        self.connection.read().clone().ok_or(Error::NotConnected)
    }

    /// Sends through the current connection.
    pub(crate) async fn send(
        &self,
        request: Request,
        ack_only: bool,
        request_timeout: Duration,
    ) -> Result<PendingRequest> {
        let connection = self.connection()?;
        connection.send(request, ack_only, request_timeout).await
    }

    /// Returns the default request timeout.
    #[inline]
    pub(crate) fn request_timeout(&self) -> Duration {
        self.options.request_timeout
    }

    /// Drops `session_id` from the session table.
    pub(crate) fn forget_session(&self, session_id: &SessionId) {
        if self.sessions.lock().remove(session_id).is_some() {
            debug!(%session_id, "Session unregistered");
        }
    }

    /// Routes an event frame to its session.
    fn route_event(&self, frame: Frame) -> std::result::Result<(), RoutingAnomaly> {
        let session_id = frame.session_id().ok_or(RoutingAnomaly::Unscoped)?;

        // Clone out so listeners run without the table lock
        let session = self.sessions.lock().get(session_id).cloned();
        match session {
            Some(session) => session.on_session_message(frame),
            None => Err(RoutingAnomaly::UnknownSession {
                session_id: session_id.clone(),
            }),
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Client for a Janus gateway WebSocket endpoint.
///
/// Cheap to clone; clones share the connection and session table.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use janus_client::Client;
///
/// # async fn example() -> janus_client::Result<()> {
/// let client = Client::builder().uri("ws://127.0.0.1:8188").build()?;
/// client.connect().await?;
///
/// let session = client.create_session(Duration::from_secs(25)).await?;
/// let handle = session.attach("janus.plugin.echotest").await?;
/// handle.on("event", |frame| println!("{frame}"));
///
/// session.close().await;
/// client.disconnect().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("uri", &self.inner.uri.as_str())
            .field("connected", &self.is_connected())
            .field("sessions", &self.session_count())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates an unconnected client. Use [`ClientBuilder::build`].
    pub(crate) fn new(uri: Url, options: ClientOptions) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                uri,
                options,
                connection: RwLock::new(None),
                sessions: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    /// Returns the gateway URI.
    #[inline]
    #[must_use]
    pub fn uri(&self) -> &Url {
        &self.inner.uri
    }

    /// Returns the client options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }
}

// ============================================================================
// Client - Connection Lifecycle
// ============================================================================

impl Client {
    /// Opens the WebSocket and starts the dispatch loop.
    ///
    /// Does nothing if already connected. A connection that died is
    /// replaced.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the handshake exceeds the connect timeout
    /// - [`Error::Connection`] if the handshake fails
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let options = &self.inner.options;
        let connection = Connection::open(
            &self.inner.uri,
            &options.subprotocol,
            options.connect_timeout,
            self.event_router(),
        )
        .await?;

        let previous = self.inner.connection.write().replace(Arc::new(connection));
        if let Some(previous) = previous {
            previous.shutdown().await;
        }
        Ok(())
    }

    /// Stops every session's keep-alive, then closes the connection.
    ///
    /// Outstanding requests fail with [`Error::ConnectionClosed`]. The
    /// session table is cleared; server-side sessions are left to expire.
    pub async fn disconnect(&self) {
        let connection = self.inner.connection.write().take();

        let sessions: Vec<Session> = self.inner.sessions.lock().drain().map(|(_, s)| s).collect();
        for session in &sessions {
            session.close().await;
        }

        if let Some(connection) = connection {
            connection.shutdown().await;
            info!(sessions = sessions.len(), "Client disconnected");
        }
    }

    /// Returns `true` while a connection exists and its dispatch loop runs.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner
            .connection
            .read()
            .as_ref()
            .is_some_and(|connection| connection.is_alive())
    }

    /// Builds the handler that routes event frames to sessions.
    fn event_router(&self) -> EventHandler {
        let inner: Weak<ClientInner> = Arc::downgrade(&self.inner);
        Box::new(move |frame: Frame| match inner.upgrade() {
            Some(inner) => inner.route_event(frame),
            None => Err(RoutingAnomaly::ClientDropped),
        })
    }
}

// ============================================================================
// Client - Requests
// ============================================================================

impl Client {
    /// Sends a request with the default timeout.
    ///
    /// See [`send_with_timeout`](Self::send_with_timeout).
    ///
    /// # Errors
    ///
    /// See [`send_with_timeout`](Self::send_with_timeout).
    pub async fn send(&self, request: impl Into<Request>, ack_only: bool) -> Result<PendingRequest> {
        self.send_with_timeout(request, ack_only, self.inner.request_timeout())
            .await
    }

    /// Sends a request and returns its correlation record.
    ///
    /// Await [`PendingRequest::response`] (or
    /// [`acknowledged`](PendingRequest::acknowledged) for `ack_only`)
    /// on the result; each wait is bounded by `request_timeout`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] before [`connect`](Self::connect)
    /// - [`Error::ConnectionClosed`] if the connection has died
    /// - [`Error::Connection`] if the write fails
    pub async fn send_with_timeout(
        &self,
        request: impl Into<Request>,
        ack_only: bool,
        request_timeout: Duration,
    ) -> Result<PendingRequest> {
        self.inner
            .send(request.into(), ack_only, request_timeout)
            .await
    }

    /// Queries gateway information.
    ///
    /// Returns the raw reply, whatever its `janus` type.
    ///
    /// # Errors
    ///
    /// Any [`send`](Self::send) error, or [`Error::RequestTimeout`].
    pub async fn get_info(&self) -> Result<Value> {
        self.send(Command::Info, false).await?.response().await
    }

    /// Creates a gateway session and registers it for event routing.
    ///
    /// A non-zero `keepalive` starts a loop that sends `keepalive` at
    /// that interval until [`Session::close`].
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] carrying the raw reply on a non-success answer
    /// - any [`send`](Self::send) error, or [`Error::RequestTimeout`]
    pub async fn create_session(&self, keepalive: Duration) -> Result<Session> {
        let reply = self.send(Command::Create, false).await?.response().await?;
        let session_id = SessionId::from(allocated_id(reply)?);

        let session = Session::new(session_id.clone(), Arc::downgrade(&self.inner), keepalive);
        self.inner
            .sessions
            .lock()
            .insert(session_id.clone(), session.clone());

        debug!(%session_id, keepalive_ms = millis(keepalive), "Session created");
        Ok(session)
    }
}

// ============================================================================
// Client - Lookups
// ============================================================================

impl Client {
    /// Returns the registered session with `id`.
    #[must_use]
    pub fn session(&self, id: &SessionId) -> Option<Session> {
        self.inner.sessions.lock().get(id).cloned()
    }

    /// Returns the number of registered sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Returns the number of outstanding transactions.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner
            .connection
            .read()
            .as_ref()
            .map_or(0, |connection| connection.pending_count())
    }

    /// Returns the number of frames dropped as routing anomalies.
    #[must_use]
    pub fn anomaly_count(&self) -> u64 {
        self.inner
            .connection
            .read()
            .as_ref()
            .map_or(0, |connection| connection.anomaly_count())
    }
}

// ============================================================================
// Tests
// ============================================================================
