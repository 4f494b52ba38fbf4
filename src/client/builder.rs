//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`Client`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use janus_client::Client;
//!
//! # async fn example() -> janus_client::Result<()> {
//! let client = Client::builder()
//!     .uri("ws://127.0.0.1:8188")
//!     .request_timeout(Duration::from_secs(10))
//!     .build()?;
//!
//! client.connect().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

use super::core::Client;
use super::options::ClientOptions;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] instance.
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct ClientBuilder {
    /// Gateway WebSocket URI.
    uri: Option<String>,
    /// Connection options.
    options: ClientOptions,
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a new builder with default options and no URI.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the gateway URI (`ws://` or `wss://`).
    #[inline]
    #[must_use]
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Sets the negotiated WebSocket subprotocol.
    ///
    /// Defaults to `janus-protocol`.
    #[inline]
    #[must_use]
    pub fn subprotocol(mut self, subprotocol: impl Into<String>) -> Self {
        self.options = self.options.with_subprotocol(subprotocol);
        self
    }

    /// Sets the default request timeout.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_request_timeout(timeout);
        self
    }

    /// Sets the WebSocket handshake timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_connect_timeout(timeout);
        self
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the client with validation.
    ///
    /// The client is not connected yet; call [`Client::connect`].
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URI is missing or not `ws`/`wss`
    /// - [`Error::Url`] if the URI cannot be parsed
    /// - [`Error::Config`] if a timeout is zero or the subprotocol is empty
    pub fn build(self) -> Result<Client> {
        let uri = self.validate_uri()?;
        self.validate_options()?;

        Ok(Client::new(uri, self.options))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    /// Validates the gateway URI.
    fn validate_uri(&self) -> Result<Url> {
        let raw = self.uri.as_deref().ok_or_else(|| {
            Error::config(
                "Gateway URI is required. Use .uri() to set it.\n\
                 Example: Client::builder().uri(\"ws://127.0.0.1:8188\")",
            )
        })?;

        let uri = Url::parse(raw)?;
        match uri.scheme() {
            "ws" | "wss" => Ok(uri),
            other => Err(Error::config(format!(
                "Unsupported URI scheme {other:?}; expected ws or wss"
            ))),
        }
    }

    /// Validates timeouts and subprotocol.
    fn validate_options(&self) -> Result<()> {
        if self.options.subprotocol.trim().is_empty() {
            return Err(Error::config("Subprotocol must not be empty"));
        }
        if self.options.request_timeout.is_zero() {
            return Err(Error::config("Request timeout must be greater than zero"));
        }
        if self.options.connect_timeout.is_zero() {
            return Err(Error::config("Connect timeout must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
