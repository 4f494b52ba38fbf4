//! Gateway client and configuration.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Owns the connection and the session table |
//! | [`ClientBuilder`] | Fluent, validated configuration |
//! | [`ClientOptions`] | Subprotocol and timeouts |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for client configuration.
pub mod builder;

/// Core client implementation.
pub mod core;

/// Connection options and defaults.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use core::Client;
pub use options::ClientOptions;
