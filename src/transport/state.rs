//! Connection state machine.
//!
//! ```text
//!            connect()             handshake ok
//!   Idle ───────────────► Connecting ───────────► Open
//!                           │   ▲                  │
//!            handshake fail │   │ connect()        │ disconnect()
//!            or disconnect  ▼   │                  ▼
//!                          Closed ◄──────────── Closing
//!                             ▲
//!                             └──── remote close / transport error (from Open)
//! ```
//!
//! A newer `connect()` while `Connecting` cancels the older attempt, which
//! passes the state through `Closing` and `Closed` before re-entering
//! `Connecting`. The older handshake is then discarded by generation.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of one channel's connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Never connected.
    #[default]
    Idle,
    /// Handshake in flight.
    Connecting,
    /// Handshake complete; messages may flow.
    Open,
    /// Close requested, socket still draining.
    Closing,
    /// Closed by either side or failed to open.
    Closed,
}

impl ConnectionState {
    /// Returns `true` if messages may be sent.
    #[inline]
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` if `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::{Closed, Closing, Connecting, Idle, Open};

        matches!(
            (self, next),
            (Idle | Closed | Connecting, Connecting)
                | (Connecting, Open | Closing | Closed)
                | (Open, Closing | Closed)
                | (Closing, Closed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Tests
// ============================================================================
