//! Client connection options.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use janus_client::ClientOptions;
//!
//! let options = ClientOptions::new()
//!     .with_request_timeout(Duration::from_secs(10))
//!     .with_connect_timeout(Duration::from_secs(5));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// WebSocket subprotocol the gateway expects.
pub const DEFAULT_SUBPROTOCOL: &str = "janus-protocol";

/// Default bound for `info`, `create`, `attach` and default-timeout sends.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ClientOptions
// ============================================================================

/// Tunables applied to a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Value of the `Sec-WebSocket-Protocol` header.
    pub subprotocol: String,

    /// Timeout applied when the caller does not pass one.
    pub request_timeout: Duration,

    /// Timeout for the WebSocket handshake.
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientOptions {
    /// Creates options with the default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            subprotocol: DEFAULT_SUBPROTOCOL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sets the negotiated subprotocol.
    #[inline]
    #[must_use]
    pub fn with_subprotocol(mut self, subprotocol: impl Into<String>) -> Self {
        self.subprotocol = subprotocol.into();
        self
    }

    /// Sets the default request timeout.
    #[inline]
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
