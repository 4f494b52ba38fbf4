//! Inbound frame envelope.
//!
//! Everything the gateway sends is a JSON object with a `janus` field.
//! The dispatch loop only needs four fields to route a frame; the rest
//! stays in [`Frame::raw`] and is handed to callers untouched.
//!
//! | Frame | `transaction` | Routed by |
//! |-------|---------------|-----------|
//! | ack | yes | transaction table |
//! | success / error | yes | transaction table |
//! | event, webrtcup, hangup, ... | no | `session_id`, then `sender` |

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{HandleId, ServerId, SessionId, TransactionId};

// ============================================================================
// Constants
// ============================================================================

/// `janus` value of an acknowledgement.
pub const ACK: &str = "ack";

/// `janus` value of a successful final response.
pub const SUCCESS: &str = "success";

/// `janus` value of a failed final response.
pub const ERROR: &str = "error";

// ============================================================================
// Frame
// ============================================================================

/// Routing fields decoded from an inbound object.
#[derive(Deserialize)]
struct Envelope {
    janus: String,
    #[serde(default)]
    transaction: Option<TransactionId>,
    #[serde(default)]
    session_id: Option<SessionId>,
    #[serde(default)]
    sender: Option<HandleId>,
}

/// A message received from the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    kind: String,
    transaction: Option<TransactionId>,
    session_id: Option<SessionId>,
    sender: Option<HandleId>,
    raw: Value,
}

impl Frame {
    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the text is not a JSON object carrying
    /// a string `janus` field.
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Decodes routing fields from an already parsed value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the routing fields are missing or
    /// have the wrong type.
    pub fn from_value(raw: Value) -> Result<Self> {
        let envelope = Envelope::deserialize(&raw).map_err(Error::Json)?;
        Ok(Self {
            kind: envelope.janus,
            transaction: envelope.transaction,
            session_id: envelope.session_id,
            sender: envelope.sender,
            raw,
        })
    }

    /// Returns the `janus` message type.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the correlation key, if any.
    #[inline]
    #[must_use]
    pub fn transaction(&self) -> Option<&TransactionId> {
        self.transaction.as_ref()
    }

    /// Returns the session scope, if any.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Returns the originating handle, if any.
    #[inline]
    #[must_use]
    pub fn sender(&self) -> Option<&HandleId> {
        self.sender.as_ref()
    }

    /// Returns the whole frame as received.
    #[inline]
    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Consumes the frame, returning the raw value.
    #[inline]
    #[must_use]
    pub fn into_raw(self) -> Value {
        self.raw
    }

    /// Returns `true` for an acknowledgement.
    #[inline]
    #[must_use]
    pub fn is_ack(&self) -> bool {
        self.kind == ACK
    }

    /// Returns `true` for a successful final response.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.kind == SUCCESS
    }
}

/// Extracts `data.id` from a raw success frame.
///
/// `create` and `attach` report the allocated id there.
#[must_use]
pub fn data_id(raw: &Value) -> Option<ServerId> {
    raw.get("data")
        .and_then(|data| data.get("id"))
        .and_then(|id| ServerId::deserialize(id).ok())
}

/// Reads the id allocated by a `create` or `attach` reply.
///
/// # Errors
///
/// Returns [`Error::Protocol`] carrying `raw` when the reply is not a
/// success or lacks `data.id`.
pub(crate) fn allocated_id(raw: Value) -> Result<ServerId> {
    if raw.get("janus").and_then(Value::as_str) != Some(SUCCESS) {
        return Err(Error::unexpected_response(raw));
    }
    match data_id(&raw) {
        Some(id) => Ok(id),
        None => Err(Error::malformed_response("success response without data.id", raw)),
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
    fn test_parse_ack() {
        let frame = Frame::parse(r#"{"janus":"ack","session_id":1,"transaction":"abc123"}"#)
            .expect("parse");

        assert!(frame.is_ack());
        assert!(!frame.is_success());
        assert_eq!(frame.transaction(), Some(&TransactionId::from("abc123")));
    }

    #[test]
    fn test_parse_success_with_data_id() {
        let frame =
            Frame::parse(r#"{"janus":"success","transaction":"abc123","data":{"id":"sess1"}}"#)
                .expect("parse");

        assert!(frame.is_success());
        assert_eq!(data_id(frame.raw()), Some(ServerId::Text("sess1".into())));
    }

    #[test]
    fn test_parse_plugin_event() {
        let frame = Frame::parse(
            r#"{"janus":"event","session_id":8,"sender":9,"plugindata":{"plugin":"x","data":{}}}"#,
        )
        .expect("parse");

        assert_eq!(frame.kind(), "event");
        assert!(frame.transaction().is_none());
        assert_eq!(frame.session_id(), Some(&SessionId::from(8_u64)));
        assert_eq!(frame.sender(), Some(&HandleId::from(9_u64)));
        assert_eq!(frame.raw()["plugindata"]["plugin"], "x");
    }

    #[test]
    fn test_null_fields_read_as_absent() {
        let frame = Frame::from_value(json!({"janus": "timeout", "session_id": 3, "sender": null}))
            .expect("parse");
        assert!(frame.sender().is_none());
    }

    #[test]
    fn test_missing_janus_is_rejected() {
        assert!(matches!(
            Frame::parse(r#"{"transaction":"abc"}"#),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_non_json_is_rejected() {
        assert!(Frame::parse("not json").is_err());
    }

    #[test]
    fn test_allocated_id_from_success() {
        let id = allocated_id(json!({"janus": "success", "data": {"id": 42}})).expect("id");
        assert_eq!(id, ServerId::Number(42));
    }

    #[test]
    fn test_allocated_id_error_keeps_payload() {
        let raw = json!({"janus": "error", "error": {"code": 460, "reason": "No such session"}});
        let err = allocated_id(raw.clone()).unwrap_err();
        assert_eq!(err.payload(), Some(&raw));
    }

    #[test]
    fn test_allocated_id_requires_data_id() {
        let err = allocated_id(json!({"janus": "success", "data": {}})).unwrap_err();
        assert!(err.to_string().contains("data.id"));
        assert!(err.payload().is_some());
    }

    #[test]
    fn test_data_id_missing() {
        assert!(data_id(&json!({"janus": "success"})).is_none());
        assert!(data_id(&json!({"janus": "success", "data": {"id": [1]}})).is_none());
    }
}
