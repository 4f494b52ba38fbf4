//! Gateway wire protocol message types.
//!
//! JSON objects over a text WebSocket channel negotiated with the
//! `janus-protocol` subprotocol.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Client → Gateway | Command with routing fields |
//! | `Frame` (ack) | Gateway → Client | Early receipt of a slow request |
//! | `Frame` (success/error) | Gateway → Client | Final response |
//! | `Frame` (event) | Gateway → Client | Session or plugin notification |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Request shapes |
//! | `frame` | Inbound envelope |
//! | `request` | Outbound envelope |

// ============================================================================
// Submodules
// ============================================================================

/// Request shapes.
pub mod command;

/// Inbound frame envelope.
pub mod frame;

/// Outbound request envelope.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::Command;
pub use frame::Frame;
pub use request::Request;
