//! Error types for the Janus client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use janus_client::{Error, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     let session = client.create_session(Duration::from_secs(30)).await?;
//!     let handle = session.attach("janus.plugin.echotest").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`] |
//! | Connection | [`Error::NotConnected`], [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`] |
//! | Lifecycle | [`Error::SessionClosed`] |
//! | Execution | [`Error::RequestTimeout`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |
//!
//! Frames that cannot be attributed to any caller are described by
//! [`RoutingAnomaly`]. They are logged by the dispatch loop and never
//! returned from an API call.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{HandleId, SessionId, TransactionId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned by [`ClientBuilder::build`](crate::ClientBuilder::build)
    /// when a setting is missing or invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument passed to an operation.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Operation attempted before `connect` (or after `disconnect`).
    #[error("Not connected")]
    NotConnected,

    /// Transport establishment, read or write failure.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// WebSocket handshake did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The connection was closed while the operation was outstanding.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// The server answered with something other than success.
    ///
    /// `payload` holds the raw server frame, verbatim, when one exists.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
        /// Raw frame returned by the server.
        payload: Option<Value>,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// The owning session was closed or dropped.
    #[error("Session {session_id} is closed")]
    SessionClosed {
        /// The closed session.
        session_id: SessionId,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// The awaited completion slot did not resolve in time.
    #[error("Transaction {transaction} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The transaction that timed out.
        transaction: TransactionId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Gateway URI could not be parsed.
    #[error("Invalid URI: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error for a frame of the right kind but the wrong shape.
    #[inline]
    pub fn malformed_response(message: impl Into<String>, payload: Value) -> Self {
        Self::Protocol {
            message: message.into(),
            payload: Some(payload),
        }
    }

    /// Creates a protocol error carrying the raw server frame.
    ///
    /// The message is the frame serialized verbatim so nothing the
    /// server reported is lost in the `Display` output.
    #[inline]
    pub fn unexpected_response(payload: Value) -> Self {
        Self::Protocol {
            message: payload.to_string(),
            payload: Some(payload),
        }
    }

    /// Creates a session closed error.
    #[inline]
    pub fn session_closed(session_id: SessionId) -> Self {
        Self::SessionClosed { session_id }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(transaction: TransactionId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            transaction,
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    ///
    /// Connection errors are terminal for the whole client.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns the raw server frame attached to a protocol error.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Protocol { payload, .. } => payload.as_ref(),
            _ => None,
        }
    }
}

// ============================================================================
// RoutingAnomaly
// ============================================================================

/// An inbound frame that cannot be attributed to any caller.
///
/// Anomalies are dropped by the dispatch loop: raising them would abort
/// unrelated in-flight work.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingAnomaly {
    /// Reply for a transaction that is not outstanding.
    #[error("unknown transaction {transaction}")]
    UnknownTransaction {
        /// The unmatched transaction.
        transaction: TransactionId,
    },

    /// Event for a session that is not registered.
    #[error("unknown session {session_id}")]
    UnknownSession {
        /// The unmatched session.
        session_id: SessionId,
    },

    /// Event from a handle that is not attached to its session.
    #[error("unknown sender {sender} in session {session_id}")]
    UnknownSender {
        /// Session the event was addressed to.
        session_id: SessionId,
        /// The unmatched handle.
        sender: HandleId,
    },

    /// Event without any session scope.
    #[error("event without session_id")]
    Unscoped,

    /// Event that arrived after the owning client was dropped.
    #[error("event arrived after the client was dropped")]
    ClientDropped,

    /// Frame that is not a JSON object with a `janus` field.
    #[error("malformed frame: {reason}")]
    Malformed {
        /// Parser error.
        reason: String,
    },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_error_display() {
        let err = Error::connection("handshake refused");
        assert_eq!(err.to_string(), "Connection failed: handshake refused");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("uri is required");
        assert_eq!(err.to_string(), "Configuration error: uri is required");
    }

    #[test]
    fn test_unexpected_response_keeps_payload_verbatim() {
        let frame = json!({"janus": "error", "error": {"code": 458, "reason": "No such session"}});
        let err = Error::unexpected_response(frame.clone());

        assert_eq!(err.payload(), Some(&frame));
        assert!(err.to_string().contains("No such session"));
        assert!(err.to_string().contains("458"));
    }

    #[test]
    fn test_malformed_response_keeps_message_and_payload() {
        let frame = json!({"janus": "success", "data": {}});
        let err = Error::malformed_response("success response without data.id", frame.clone());

        assert_eq!(err.payload(), Some(&frame));
        assert_eq!(err.to_string(), "Protocol error: success response without data.id");
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::request_timeout(TransactionId::generate(), 5000);
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::NotConnected.is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::connection("x").is_connection_error());
        assert!(!Error::unexpected_response(json!({"janus": "error"})).is_connection_error());
        assert!(!Error::config("x").is_connection_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_routing_anomaly_display() {
        let anomaly = RoutingAnomaly::UnknownSender {
            session_id: SessionId::from(7_u64),
            sender: HandleId::from("h1"),
        };
        assert_eq!(anomaly.to_string(), "unknown sender h1 in session 7");
    }
}
