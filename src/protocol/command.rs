//! Request shapes understood by the gateway core.
//!
//! Every command serializes with a `janus` discriminator:
//!
//! | Command | Wire shape | Scope |
//! |---------|------------|-------|
//! | `Info` | `{"janus":"info"}` | connection |
//! | `Create` | `{"janus":"create"}` | connection |
//! | `Attach` | `{"janus":"attach","plugin":..}` | session |
//! | `Keepalive` | `{"janus":"keepalive"}` | session |
//! | `Message` | `{"janus":"message","body":..,"jsep":..}` | handle |
//!
//! Plugin bodies and session descriptions are opaque JSON values.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Command
// ============================================================================

/// A gateway request without routing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "janus", rename_all = "lowercase")]
pub enum Command {
    /// Ask the gateway to describe itself.
    Info,

    /// Create a new session.
    Create,

    /// Attach a plugin to a session.
    Attach {
        /// Plugin package name, e.g. `janus.plugin.videoroom`.
        plugin: String,
    },

    /// Keep a session from expiring.
    Keepalive,

    /// Send a plugin message through a handle.
    Message {
        /// Plugin-specific request body.
        body: Value,
        /// Optional session description (offer/answer).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jsep: Option<Value>,
    },
}

impl Command {
    /// Creates an attach command.
    #[inline]
    #[must_use]
    pub fn attach(plugin: impl Into<String>) -> Self {
        Self::Attach {
            plugin: plugin.into(),
        }
    }

    /// Creates a plugin message command.
    #[inline]
    #[must_use]
    pub fn message(body: Value, jsep: Option<Value>) -> Self {
        Self::Message { body, jsep }
    }

    /// Returns the `janus` value this command serializes with.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Create => "create",
            Self::Attach { .. } => "attach",
            Self::Keepalive => "keepalive",
            Self::Message { .. } => "message",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
