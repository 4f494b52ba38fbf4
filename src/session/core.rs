//! Gateway session.
//!
//! A [`Session`] is created by [`Client::create_session`](crate::Client::create_session).
//! It stamps `session_id` on everything it sends, owns the handles attached
//! through it, and optionally keeps itself alive on the gateway.
//!
//! # Keep-alive
//!
//! With a non-zero interval a tokio task sleeps, sends an ack-only
//! `keepalive`, and repeats. [`Session::close`] zeroes the interval and
//! awaits the task, so no keep-alive is written after `close` returns.
//! The loop also stops when the connection is gone or the session is
//! dropped.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::client::core::ClientInner;
use crate::client::options::DEFAULT_REQUEST_TIMEOUT;
use crate::error::{Error, Result, RoutingAnomaly};
use crate::events::{EventEmitter, ListenerId};
use crate::identifiers::{HandleId, SessionId};
use crate::protocol::frame::allocated_id;
use crate::protocol::{Command, Frame, Request};
use crate::transport::{PendingRequest, millis};

use super::handle::Handle;

// ============================================================================
// SessionInner
// ============================================================================

/// Shared state behind every [`Session`] clone.
pub(crate) struct SessionInner {
    /// Server-assigned id.
    id: SessionId,
    /// Owning client (routing only).
    client: Weak<ClientInner>,
    /// Handles keyed by server-assigned id.
    handles: Mutex<FxHashMap<HandleId, Handle>>,
    /// Listeners for session-level events.
    events: EventEmitter,
    /// Keep-alive interval; zero stops the loop.
    keepalive: watch::Sender<Duration>,
    /// Keep-alive task, awaited on close.
    keepalive_task: Mutex<Option<JoinHandle<()>>>,
    /// Set once by `close`.
    closed: AtomicBool,
}

// ============================================================================
// Session
// ============================================================================

/// A session on the gateway.
///
/// Cheap to clone; clones share handles, listeners and the keep-alive loop.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("handles", &self.handle_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Session - Constructor
// ============================================================================

impl Session {
    /// Creates a session and starts its keep-alive loop if `keepalive` is non-zero.
    pub(crate) fn new(id: SessionId, client: Weak<ClientInner>, keepalive: Duration) -> Self {
        let (interval_tx, interval_rx) = watch::channel(keepalive);

        let session = Self {
            inner: Arc::new(SessionInner {
                id,
                client,
                handles: Mutex::new(FxHashMap::default()),
                events: EventEmitter::new(),
                keepalive: interval_tx,
                keepalive_task: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        };

        if !keepalive.is_zero() {
            let task = tokio::spawn(run_keepalive(Arc::downgrade(&session.inner), interval_rx));
            *session.inner.keepalive_task.lock() = Some(task);
        }

        session
    }
}

// ============================================================================
// Session - Accessors
// ============================================================================

impl Session {
    /// Returns the server-assigned id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.inner.id
    }

    /// Returns `true` after [`close`](Self::close).
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Returns the current keep-alive interval (zero when stopped).
    #[inline]
    #[must_use]
    pub fn keepalive_interval(&self) -> Duration {
        *self.inner.keepalive.borrow()
    }

    /// Returns the attached handle with `id`.
    #[must_use]
    pub fn handle(&self, id: &HandleId) -> Option<Handle> {
        self.inner.handles.lock().get(id).cloned()
    }

    /// Returns the number of attached handles.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        self.inner.handles.lock().len()
    }
}

// ============================================================================
// Session - Events
// ============================================================================

impl Session {
    /// Registers a listener for session-level frames.
    ///
    /// Frames from a handle go to that handle instead.
    pub fn on<F>(&self, event: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.events.on(event, listener)
    }

    /// Removes a listener.
    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    /// Returns the session's listener registry.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &EventEmitter {
        &self.inner.events
    }

    /// Routes an event frame addressed to this session.
    pub(crate) fn on_session_message(&self, frame: Frame) -> std::result::Result<(), RoutingAnomaly> {
        let Some(sender) = frame.sender() else {
            self.inner.events.publish(&frame);
            return Ok(());
        };

        let handle = self.inner.handles.lock().get(sender).cloned();
        match handle {
            Some(handle) => {
                handle.on_handle_message(&frame);
                Ok(())
            }
            None => Err(RoutingAnomaly::UnknownSender {
                session_id: self.inner.id.clone(),
                sender: sender.clone(),
            }),
        }
    }
}

// ============================================================================
// Session - Requests
// ============================================================================

impl Session {
    /// Sends a session-scoped request with the client's default timeout.
    ///
    /// # Errors
    ///
    /// See [`send_with_timeout`](Self::send_with_timeout).
    pub async fn send(&self, request: impl Into<Request>, ack_only: bool) -> Result<PendingRequest> {
        let request_timeout = self
            .inner
            .client
            .upgrade()
            .map_or(DEFAULT_REQUEST_TIMEOUT, |client| client.request_timeout());
        self.send_with_timeout(request, ack_only, request_timeout)
            .await
    }

    /// Stamps `session_id` on `request` and sends it.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] after [`close`](Self::close)
    /// - [`Error::NotConnected`] if the client is gone or disconnected
    /// - any other [`Client::send`](crate::Client::send) error
    pub async fn send_with_timeout(
        &self,
        request: impl Into<Request>,
        ack_only: bool,
        request_timeout: Duration,
    ) -> Result<PendingRequest> {
        if self.is_closed() {
            return Err(Error::session_closed(self.inner.id.clone()));
        }

        let request = request.into().with_session(self.inner.id.clone());
        self.client()?
            .send(request, ack_only, request_timeout)
            .await
    }

    /// Attaches `plugin` and registers the new handle for event routing.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] carrying the raw reply on a non-success answer
    /// - any [`send`](Self::send) error, or [`Error::RequestTimeout`]
    pub async fn attach(&self, plugin: impl Into<String>) -> Result<Handle> {
        let plugin = plugin.into();
        let reply = self
            .send(Command::attach(plugin.clone()), false)
            .await?
            .response()
            .await?;
        let handle_id = HandleId::from(allocated_id(reply)?);

        let handle = Handle::new(
            handle_id.clone(),
            plugin,
            self.inner.id.clone(),
            Arc::downgrade(&self.inner),
        );
        self.inner
            .handles
            .lock()
            .insert(handle_id.clone(), handle.clone());

        debug!(session_id = %self.inner.id, %handle_id, plugin = handle.plugin(), "Handle attached");
        Ok(handle)
    }

    /// Sends an ack-only `keepalive` without waiting for the ack.
    ///
    /// The transaction stays registered until the ack arrives or the
    /// request timeout elapses.
    ///
    /// # Errors
    ///
    /// Any [`send`](Self::send) error.
    pub async fn keepalive(&self) -> Result<()> {
        let pending = self.send(Command::Keepalive, true).await?;
        trace!(session_id = %self.inner.id, transaction = %pending.transaction(), "Keep-alive sent");
        pending.detach();
        Ok(())
    }

    /// Stops the keep-alive loop and unregisters the session.
    ///
    /// Later sends fail with [`Error::SessionClosed`]. Handles stay
    /// attached on the gateway. Calling this more than once is harmless.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.inner.keepalive.send_replace(Duration::ZERO);

        let task = self.inner.keepalive_task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            debug!(error = %e, "Keep-alive task ended abnormally");
        }

        if let Some(client) = self.inner.client.upgrade() {
            client.forget_session(&self.inner.id);
        }

        debug!(session_id = %self.inner.id, "Session closed");
    }

    /// Returns the owning client.
    fn client(&self) -> Result<Arc<ClientInner>> {
        self.inner.client.upgrade().ok_or(Error::NotConnected)
    }
}

// ============================================================================
// Keep-alive Loop
// ============================================================================

/// Sends `keepalive` every interval until the interval becomes zero.
async fn run_keepalive(session: Weak<SessionInner>, mut interval_rx: watch::Receiver<Duration>) {
    loop {
        let interval = *interval_rx.borrow_and_update();
        if interval.is_zero() {
            break;
        }

        tokio::select! {
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            () = sleep(interval) => {}
        }

        // Both branches may be ready together
        if interval_rx.borrow().is_zero() {
            break;
        }

        let Some(inner) = session.upgrade() else {
            break;
        };
        let live = Session { inner };

        match live.keepalive().await {
            Ok(()) => {}
            Err(e) if e.is_connection_error() || matches!(e, Error::SessionClosed { .. }) => {
                debug!(session_id = %live.id(), error = %e, "Keep-alive loop stopping");
                break;
            }
            Err(e) => {
                warn!(session_id = %live.id(), error = %e, "Keep-alive failed");
            }
        }
    }

    trace!(interval_ms = millis(*interval_rx.borrow()), "Keep-alive loop terminated");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn orphan(id: &str, keepalive: Duration) -> Session {
        Session::new(SessionId::from(id), Weak::new(), keepalive)
    }

    #[tokio::test]
    async fn test_send_after_close_is_session_closed() {
        let session = orphan("s1", Duration::ZERO);
        session.close().await;

        let err = session.send(Command::Keepalive, true).await.unwrap_err();
        assert!(matches!(err, Error::SessionClosed { .. }));
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_send_without_client_is_not_connected() {
        let session = orphan("s1", Duration::ZERO);
        let err = session.send(Command::Keepalive, true).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_keepalive_task() {
        let session = orphan("s1", Duration::from_secs(30));
        assert!(session.inner.keepalive_task.lock().is_some());

        session.close().await;

        assert!(session.inner.keepalive_task.lock().is_none());
        assert_eq!(session.keepalive_interval(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_loop_exits_without_client() {
        let session = orphan("s1", Duration::from_secs(1));
        let task = session
            .inner
            .keepalive_task
            .lock()
            .take()
            .expect("keep-alive task");

        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("loop exits")
            .expect("no panic");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let session = orphan("s1", Duration::ZERO);
        session.close().await;
        session.close().await;
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_event_without_sender_reaches_session_listeners() {
        let session = orphan("s1", Duration::ZERO);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.on("message", move |frame| sink.lock().push(frame["janus"].clone()));

        let frame = Frame::from_value(json!({"janus": "timeout", "session_id": "s1"})).expect("frame");
        session.on_session_message(frame).expect("routed");

        assert_eq!(*seen.lock(), vec![json!("timeout")]);
    }

    #[tokio::test]
    async fn test_event_with_sender_reaches_only_that_handle() {
        let session = orphan("s1", Duration::ZERO);
        let attach = |id: u64, plugin: &str| {
            Handle::new(HandleId::from(id), plugin.into(), session.id().clone(), Arc::downgrade(&session.inner))
        };
        let h1 = attach(1, "a");
        let h2 = attach(2, "b");
        session.inner.handles.lock().insert(h1.id().clone(), h1.clone());
        session.inner.handles.lock().insert(h2.id().clone(), h2.clone());

        let hits = Arc::new(Mutex::new(Vec::new()));
        for (name, target) in [("session", None), ("h1", Some(&h1)), ("h2", Some(&h2))] {
            let hits = Arc::clone(&hits);
            let listener = move |_: &Value| hits.lock().push(name);
            match target {
                Some(handle) => handle.on("event", listener),
                None => session.on("event", listener),
            };
        }

        let frame = Frame::from_value(json!({"janus": "event", "session_id": "s1", "sender": 2}))
            .expect("frame");
        session.on_session_message(frame).expect("routed");

        assert_eq!(*hits.lock(), vec!["h2"]);
    }

    #[tokio::test]
    async fn test_event_from_unknown_sender_is_anomaly() {
        let session = orphan("s1", Duration::ZERO);
        let frame = Frame::from_value(json!({"janus": "event", "session_id": "s1", "sender": 99}))
            .expect("frame");

        assert_eq!(
            session.on_session_message(frame),
            Err(RoutingAnomaly::UnknownSender {
                session_id: SessionId::from("s1"),
                sender: HandleId::from(99_u64),
            })
        );
    }
}
