//! WebSocket transport layer.
//!
//! This module owns the one WebSocket to the gateway and the
//! transaction table that correlates requests with replies.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                         ┌─────────────────┐
//! │  Client (Rust)       │                         │  Janus gateway  │
//! │                      │       WebSocket         │                 │
//! │  Connection ─ send ──┼────────────────────────►│                 │
//! │  dispatch loop ◄─────┼─────────────────────────┤  ack / success  │
//! │   ├ PendingRequest   │   "janus-protocol"      │  error / event  │
//! │   └ EventHandler     │                         │                 │
//! └──────────────────────┘                         └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket connection and dispatch loop |
//! | `pending` | Two-slot correlation records |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and dispatch loop.
pub mod connection;

/// Correlation records for outstanding requests.
pub mod pending;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, EventHandler};
pub use pending::PendingRequest;

/// Converts a duration to whole milliseconds for error reporting.
#[inline]
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
