//! Per-entity listener registry.
//!
//! [`Session`](crate::Session) and [`Handle`](crate::Handle) each own an
//! [`EventEmitter`]. Listeners are grouped by event name and run
//! synchronously, in registration order, on the dispatch task.
//!
//! # Event names
//!
//! | Name | Emitted for |
//! |------|-------------|
//! | `"message"` | every frame routed to the entity |
//! | `<janus>` | the frame's own type: `"event"`, `"webrtcup"`, `"media"`, `"slowlink"`, `"hangup"`, `"detached"`, `"timeout"`, ... |
//!
//! Listeners must not block. Spawn a task for anything that needs to
//! await, such as replying through the handle.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::trace;

use crate::protocol::Frame;

// ============================================================================
// Constants
// ============================================================================

/// Event name every routed frame is emitted under.
pub const MESSAGE: &str = "message";

// ============================================================================
// Types
// ============================================================================

/// Listener callback type.
///
/// Receives the raw frame exactly as the gateway sent it.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identifies one registration for [`EventEmitter::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listeners for one event name, in registration order.
type ListenerList = Vec<(ListenerId, Listener)>;

// ============================================================================
// EventEmitter
// ============================================================================

/// Ordered listener registry keyed by event name.
#[derive(Default)]
pub struct EventEmitter {
    listeners: Mutex<FxHashMap<String, ListenerList>>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.lock();
        f.debug_struct("EventEmitter")
            .field("events", &listeners.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `event`.
    pub fn on<F>(&self, event: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .entry(event.into())
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Removes a registration. Returns `false` if it was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let mut removed = false;
        listeners.retain(|_, list| {
            let before = list.len();
            list.retain(|(listener_id, _)| *listener_id != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        removed
    }

    /// Invokes every listener registered for `event`.
    ///
    /// Returns the number of listeners called. The registry lock is not
    /// held while listeners run, so a listener may register or remove
    /// listeners; such changes apply from the next emit.
    pub fn emit(&self, event: &str, frame: &Value) -> usize {
        let snapshot: Vec<Listener> = match self.listeners.lock().get(event) {
            Some(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return 0,
        };

        trace!(event, listeners = snapshot.len(), "Emitting");

        for listener in &snapshot {
            listener(frame);
        }
        snapshot.len()
    }

    /// Emits a routed frame under [`MESSAGE`] and under its `janus` type.
    pub(crate) fn publish(&self, frame: &Frame) -> usize {
        let mut called = self.emit(MESSAGE, frame.raw());
        if frame.kind() != MESSAGE {
            called += self.emit(frame.kind(), frame.raw());
        }
        called
    }

    /// Returns the number of listeners for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.lock().get(event).map_or(0, Vec::len)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_emit_runs_in_registration_order() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            emitter.on(MESSAGE, move |_| seen.lock().push(tag));
        }

        assert_eq!(emitter.emit(MESSAGE, &json!({})), 3);
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_emit_only_reaches_named_event() {
        let emitter = EventEmitter::new();
        let hits = Arc::new(AtomicU64::new(0));
        let hits_clone = Arc::clone(&hits);
        emitter.on("hangup", move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(emitter.emit("webrtcup", &json!({})), 0);
        assert_eq!(emitter.emit("hangup", &json!({})), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_receives_frame() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = Arc::clone(&seen);
        emitter.on(MESSAGE, move |frame| *seen_clone.lock() = Some(frame.clone()));

        let frame = json!({"janus": "event", "sender": 4});
        emitter.emit(MESSAGE, &frame);
        assert_eq!(seen.lock().as_ref(), Some(&frame));
    }

    #[test]
    fn test_publish_emits_message_and_kind() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for event in [MESSAGE, "hangup", "webrtcup"] {
            let seen = Arc::clone(&seen);
            emitter.on(event, move |_| seen.lock().push(event));
        }

        let frame = Frame::from_value(json!({"janus": "hangup", "session_id": 1})).expect("frame");
        assert_eq!(emitter.publish(&frame), 2);
        assert_eq!(*seen.lock(), vec![MESSAGE, "hangup"]);
    }

    #[test]
    fn test_off_removes_registration() {
        let emitter = EventEmitter::new();
        let id = emitter.on(MESSAGE, |_| {});
        emitter.on(MESSAGE, |_| {});

        assert!(emitter.off(id));
        assert!(!emitter.off(id));
        assert_eq!(emitter.listener_count(MESSAGE), 1);
    }

    #[test]
    fn test_listener_may_register_during_emit() {
        let emitter = Arc::new(EventEmitter::new());
        let inner = Arc::clone(&emitter);
        emitter.on(MESSAGE, move |_| {
            inner.on("later", |_| {});
        });

        emitter.emit(MESSAGE, &json!({}));
        assert_eq!(emitter.listener_count("later"), 1);
    }
}
