//! Type-safe identifiers.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Backing | Source |
//! |------|---------|--------|
//! | [`ClientId`] | UUID v4 | one per [`EchoClient`](crate::EchoClient) |
//! | [`ConnectionId`] | `u64` | one per connect attempt |
//! | [`WaiterId`] | `u64` | one per pending reply waiter |
//! | [`HandlerId`] | `u64` | one per registered permanent handler |
//!
//! Counter-backed IDs are process-wide and strictly increasing, so a newer
//! connect attempt always carries a larger [`ConnectionId`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// ClientId
// ============================================================================

/// Identifies one SDK instance in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generates a new random client ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Counter-backed IDs
// ============================================================================

macro_rules! counter_id {
    ($(#[$meta:meta])* $name:ident, $counter:ident, $prefix:literal) => {
        static $counter: AtomicU64 = AtomicU64::new(1);

        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            /// Allocates the next ID from the process-wide counter.
            #[inline]
            #[must_use]
            pub fn next() -> Self {
                Self($counter.fetch_add(1, Ordering::Relaxed))
            }

            /// Wraps a raw value.
            #[inline]
            #[must_use]
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw value.
            #[inline]
            #[must_use]
            pub const fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

counter_id!(
    /// Identifies one connect attempt (and the socket it produced).
    ConnectionId,
    NEXT_CONNECTION_ID,
    "conn"
);

counter_id!(
    /// Identifies one pending reply waiter.
    WaiterId,
    NEXT_WAITER_ID,
    "waiter"
);

counter_id!(
    /// Identifies one registered permanent handler.
    HandlerId,
    NEXT_HANDLER_ID,
    "handler"
);

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_ids_increase() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert!(b > a);
    }

    #[test]
    fn test_display_prefixes() {
        assert_eq!(ConnectionId::from_raw(3).to_string(), "conn-3");
        assert_eq!(WaiterId::from_raw(5).to_string(), "waiter-5");
        assert_eq!(HandlerId::from_raw(7).to_string(), "handler-7");
    }

    #[test]
    fn test_client_ids_are_unique() {
        assert_ne!(ClientId::generate(), ClientId::generate());
    }
}
