//! Wire conventions.
//!
//! Messages on both channels are opaque UTF-8 text. The only structured
//! convention is the latency probe tag:
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | any text | Client → Echo | fire-and-forget or request |
//! | any text | Echo → Client | reply, or unsolicited message |
//! | `timestamp:<ms>` | both | latency probe and its echo |
//! | any text | Push → Client | broadcast to push handlers |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | Channel kinds and address derivation |
//! | `latency` | `timestamp:<ms>` tag codec |

// ============================================================================
// Submodules
// ============================================================================

/// Channel kinds and WebSocket address handling.
pub mod channel;

/// Latency probe tag codec.
pub mod latency;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{
    Channel, DEFAULT_ECHO_URL, TLS_SUPPORTED, derive_push_url, ensure_tls_support, parse_ws_url,
};
pub use latency::{
    TIMESTAMP_PREFIX, encode_timestamp, now_ms, parse_timestamp, saturating_millis,
};
