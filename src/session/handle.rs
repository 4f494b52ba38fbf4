//! Plugin handle.
//!
//! A [`Handle`] is created by [`Session::attach`](crate::Session::attach).
//! It sends `message` requests carrying its `handle_id` and receives the
//! events the plugin emits with `sender` set to that id.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;
use tracing::trace;

use crate::error::{Error, Result};
use crate::events::{EventEmitter, ListenerId};
use crate::identifiers::{HandleId, SessionId};
use crate::protocol::{Command, Frame, Request};
use crate::transport::PendingRequest;

use super::core::{Session, SessionInner};

// ============================================================================
// HandleInner
// ============================================================================

/// Shared state behind every [`Handle`] clone.
pub(crate) struct HandleInner {
    id: HandleId,
    plugin: String,
    session_id: SessionId,
    session: Weak<SessionInner>,
    events: EventEmitter,
}

// ============================================================================
// Handle
// ============================================================================

/// A plugin attachment inside a [`Session`].
#[derive(Clone)]
pub struct Handle {
    pub(crate) inner: Arc<HandleInner>,
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.inner.id)
            .field("plugin", &self.inner.plugin)
            .field("session_id", &self.inner.session_id)
            .finish_non_exhaustive()
    }
}

impl Handle {
    pub(crate) fn new(
        id: HandleId,
        plugin: String,
        session_id: SessionId,
        session: Weak<SessionInner>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                plugin,
                session_id,
                session,
                events: EventEmitter::new(),
            }),
        }
    }

    /// Returns the server-assigned id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &HandleId {
        &self.inner.id
    }

    /// Returns the plugin package name this handle is attached to.
    #[inline]
    #[must_use]
    pub fn plugin(&self) -> &str {
        &self.inner.plugin
    }

    /// Returns the owning session's id.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    /// Registers a listener for frames whose `sender` is this handle.
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

    /// Returns the handle's listener registry.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &EventEmitter {
        &self.inner.events
    }

    /// Sends a plugin message with the client's default timeout.
    ///
    /// # Errors
    ///
    /// See [`send_with_timeout`](Self::send_with_timeout).
    pub async fn send(&self, body: Value, jsep: Option<Value>) -> Result<PendingRequest> {
        let session = self.session()?;
        let request = self.message(body, jsep);
        session.send(request, false).await
    }

    /// Sends a plugin message.
    ///
    /// `body` and `jsep` are passed through untouched. Plugins usually
    /// ack first and deliver the actual reply as an `event` on this
    /// handle, so waiting on [`PendingRequest::response`] is optional.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] if the session was closed or dropped
    /// - any [`Session::send`] error
    pub async fn send_with_timeout(
        &self,
        body: Value,
        jsep: Option<Value>,
        request_timeout: Duration,
    ) -> Result<PendingRequest> {
        let session = self.session()?;
        let request = self.message(body, jsep);
        session.send_with_timeout(request, false, request_timeout).await
    }

    /// Republishes a frame from the plugin to this handle's listeners.
    pub(crate) fn on_handle_message(&self, frame: &Frame) {
        let called = self.inner.events.publish(frame);
        trace!(handle_id = %self.inner.id, janus = frame.kind(), listeners = called, "Handle event");
    }

    fn message(&self, body: Value, jsep: Option<Value>) -> Request {
        Request::new(Command::message(body, jsep)).with_handle(self.inner.id.clone())
    }

    fn session(&self) -> Result<Session> {
        self.inner
            .session
            .upgrade()
            .map(|inner| Session { inner })
            .ok_or_else(|| Error::session_closed(self.inner.session_id.clone()))
    }
}

// ============================================================================
// Tests
// ============================================================================
