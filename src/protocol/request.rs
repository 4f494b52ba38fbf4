//! Outbound request envelope.
//!
//! A [`Request`] is a [`Command`] plus the routing fields the gateway
//! uses to scope it. The `transaction` field is stamped by the
//! connection at send time; callers never choose it.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;

use crate::identifiers::{HandleId, SessionId, TransactionId};

use super::Command;

// ============================================================================
// Request
// ============================================================================

/// A request from client to gateway.
///
/// # Format
///
/// ```json
/// {
///   "janus": "message",
///   "body": { ... },
///   "session_id": 1234,
///   "handle_id": 5678,
///   "transaction": "3f9c1b7a0d2e4c68"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    /// Command with `janus` tag and arguments.
    #[serde(flatten)]
    pub command: Command,

    /// Session scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    /// Handle scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle_id: Option<HandleId>,

    /// Correlation key, set by the connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionId>,
}

impl Request {
    /// Creates an unscoped request.
    #[inline]
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            command,
            session_id: None,
            handle_id: None,
            transaction: None,
        }
    }

    /// Scopes the request to a session.
    #[inline]
    #[must_use]
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Scopes the request to a handle.
    #[inline]
    #[must_use]
    pub fn with_handle(mut self, handle_id: HandleId) -> Self {
        self.handle_id = Some(handle_id);
        self
    }

    /// Stamps the correlation key.
    #[inline]
    pub(crate) fn stamp(&mut self, transaction: TransactionId) {
        self.transaction = Some(transaction);
    }
}

impl From<Command> for Request {
    fn from(command: Command) -> Self {
        Self::new(command)
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
    fn test_attach_request_wire_shape() {
        let mut request = Request::new(Command::attach("videoroom")).with_session(SessionId::from("sess1"));
        request.stamp(TransactionId::from("def456"));

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "janus": "attach",
                "plugin": "videoroom",
                "session_id": "sess1",
                "transaction": "def456"
            })
        );
    }

    #[test]
    fn test_unscoped_request_has_no_routing_fields() {
        let value = serde_json::to_value(Request::from(Command::Info)).unwrap();
        assert_eq!(value, json!({"janus": "info"}));
    }

    #[test]
    fn test_handle_scope_adds_handle_id() {
        let request = Request::new(Command::message(json!({"request": "configure"}), None))
            .with_session(SessionId::from(1_u64))
            .with_handle(HandleId::from(2_u64));
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["session_id"], 1);
        assert_eq!(value["handle_id"], 2);
        assert_eq!(value["body"], json!({"request": "configure"}));
    }
}
