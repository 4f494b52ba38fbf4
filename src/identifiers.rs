//! Type-safe identifiers for transactions, sessions and handles.
//!
//! Newtype wrappers prevent mixing a session id with a handle id at
//! compile time.
//!
//! | Type | Origin | Wire field |
//! |------|--------|------------|
//! | [`TransactionId`] | client, random | `transaction` |
//! | [`SessionId`] | server, `data.id` of `create` | `session_id` |
//! | [`HandleId`] | server, `data.id` of `attach` | `handle_id` / `sender` |
//!
//! Gateways normally allocate numeric ids, but nothing in the protocol
//! forbids strings. [`ServerId`] keeps whichever JSON type the server
//! used so the id is echoed back unchanged.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// TransactionId
// ============================================================================

/// Client-chosen correlation key for one request.
///
/// 16 lowercase hex characters carrying 64 random bits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Length of a generated identifier in characters.
    pub const LEN: usize = 16;

    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        // Folding the halves cancels the fixed version and variant bits.
        let (high, low) = Uuid::new_v4().as_u64_pair();
        Self(format!("{:016x}", high ^ low))
    }

    /// Returns the identifier as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TransactionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// ServerId
// ============================================================================

/// Server-assigned identifier, numeric or textual.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerId {
    /// Numeric id (the gateway default).
    Number(u64),
    /// String id.
    Text(String),
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

// ============================================================================
// Scoped ids
// ============================================================================

macro_rules! server_scoped_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(ServerId);

        impl $name {
            /// Returns the underlying server id.
            #[inline]
            #[must_use]
            pub fn as_server_id(&self) -> &ServerId {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<ServerId> for $name {
            fn from(value: ServerId) -> Self {
                Self(value)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(ServerId::Number(value))
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(ServerId::Text(value.to_string()))
            }
        }
    };
}

server_scoped_id!(
    /// Identifier of a gateway session.
    SessionId
);

server_scoped_id!(
    /// Identifier of a plugin handle inside a session.
    HandleId
);

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use rustc_hash::FxHashSet;
    use serde_json::json;

    #[test]
    fn test_transaction_id_format() {
        let id = TransactionId::generate();
        assert_eq!(id.as_str().len(), TransactionId::LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_transaction_ids_do_not_collide() {
        let ids: FxHashSet<_> = (0..10_000).map(|_| TransactionId::generate()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_server_id_keeps_json_type() {
        let numeric: SessionId = serde_json::from_value(json!(8_123_456_789_u64)).expect("number");
        let textual: SessionId = serde_json::from_value(json!("sess1")).expect("string");

        assert_eq!(numeric, SessionId::from(8_123_456_789_u64));
        assert_eq!(textual, SessionId::from("sess1"));
        assert_eq!(serde_json::to_value(&numeric).expect("ser"), json!(8_123_456_789_u64));
        assert_eq!(serde_json::to_value(&textual).expect("ser"), json!("sess1"));
    }

    #[test]
    fn test_number_and_text_ids_are_distinct() {
        assert_ne!(HandleId::from(1_u64), HandleId::from("1"));
    }

    proptest! {
        #[test]
        fn prop_handle_id_display_matches_source(n in any::<u64>()) {
            prop_assert_eq!(HandleId::from(n).to_string(), n.to_string());
        }

        #[test]
        fn prop_transaction_id_serializes_as_plain_string(s in "[a-f0-9]{16}") {
            let id = TransactionId::from(s.as_str());
            prop_assert_eq!(serde_json::to_value(&id).unwrap(), json!(s));
        }
    }
}
