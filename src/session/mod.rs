//! Session and plugin handle scopes.
//!
//! Events from the gateway walk down this tree:
//!
//! | Frame fields | Delivered to |
//! |--------------|--------------|
//! | `session_id` only | [`Session`] listeners |
//! | `session_id` + `sender` | the [`Handle`] with that id |
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use janus_client::{Client, Result};
//! use serde_json::json;
//!
//! # async fn example(client: Client) -> Result<()> {
//! let session = client.create_session(Duration::from_secs(25)).await?;
//! let handle = session.attach("janus.plugin.videoroom").await?;
//!
//! handle.on("event", |frame| println!("plugin event: {}", frame["plugindata"]));
//! handle.send(json!({"request": "list"}), None).await?.response().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Session lifecycle, routing and keep-alive.
pub mod core;

/// Plugin handle.
pub mod handle;

// ============================================================================
// Re-exports
// ============================================================================

pub use core::Session;
pub use handle::Handle;
