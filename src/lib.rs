//! Janus Client - WebSocket signalling client for the Janus WebRTC gateway.
//!
//! This library keeps one WebSocket open to a gateway, correlates requests
//! with their replies, and routes asynchronous events to the session and
//! plugin handle they belong to.
//!
//! # Architecture
//!
//! - **Transaction table**: every request carries a random `transaction`;
//!   the dispatch loop resolves the matching [`PendingRequest`]
//! - **Routing tree**: [`Client`] → [`Session`] (by `session_id`) →
//!   [`Handle`] (by `sender`)
//! - **Listeners**: sessions and handles emit routed frames to callbacks
//!   registered with `on`
//!
//! Frames that match nothing are dropped and counted, never raised.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use janus_client::{Client, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder().uri("ws://127.0.0.1:8188").build()?;
//!     client.connect().await?;
//!
//!     let info = client.get_info().await?;
//!     println!("Gateway: {}", info["name"]);
//!
//!     let session = client.create_session(Duration::from_secs(25)).await?;
//!     let handle = session.attach("janus.plugin.echotest").await?;
//!     handle.on("event", |frame| println!("{frame}"));
//!     handle.send(json!({"audio": true, "video": true}), None).await?;
//!
//!     session.close().await;
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`], builder and options |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`events`] | Listener registry |
//! | [`identifiers`] | Transaction, session and handle ids |
//! | [`protocol`] | Wire message types |
//! | [`session`] | [`Session`] and [`Handle`] |
//! | [`transport`] | WebSocket connection and correlation |

// ============================================================================
// Modules
// ============================================================================

/// Gateway client and configuration.
///
/// Use [`Client::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Per-entity listener registry.
pub mod events;

/// Type-safe identifiers.
///
/// Session and handle ids keep the JSON type the gateway used.
pub mod identifiers;

/// Wire protocol message types.
pub mod protocol;

/// Session and handle scopes.
pub mod session;

/// WebSocket transport layer.
///
/// Connection, dispatch loop and transaction table.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientBuilder, ClientOptions};

// Error types
pub use error::{Error, Result, RoutingAnomaly};

// Event types
pub use events::{EventEmitter, ListenerId};

// Identifier types
pub use identifiers::{HandleId, ServerId, SessionId, TransactionId};

// Scope types
pub use session::{Handle, Session};

// Transport types
pub use transport::PendingRequest;
