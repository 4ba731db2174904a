//! Latency probe tag codec.
//!
//! The probe sends `timestamp:<unix-ms>` and expects the server to return the
//! same text. This is a private convention between the SDK and the echo
//! server, not a general message format.

// ============================================================================
// Imports
// ============================================================================

use std::time::{Duration, SystemTime, UNIX_EPOCH};

// ============================================================================
// Constants
// ============================================================================

/// Prefix marking a latency probe payload.
pub const TIMESTAMP_PREFIX: &str = "timestamp:";

// ============================================================================
// Functions
// ============================================================================

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Returns 0 if the system clock is set before the epoch.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(saturating_millis)
        .unwrap_or(0)
}

/// Whole milliseconds in `duration`, clamped to `u64::MAX`.
#[inline]
#[must_use]
pub fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Builds a probe payload for the given capture time.
#[inline]
#[must_use]
pub fn encode_timestamp(ms: u64) -> String {
    format!("{TIMESTAMP_PREFIX}{ms}")
}

/// Extracts the embedded capture time from a probe payload.
///
/// Only the segment between the prefix and the next `:` is read, so
/// `timestamp:123:extra` yields `123`. Returns `None` for untagged or
/// non-numeric payloads.
#[must_use]
pub fn parse_timestamp(payload: &str) -> Option<u64> {
    let rest = payload.strip_prefix(TIMESTAMP_PREFIX)?;
    let digits = rest.split(':').next()?.trim();
    digits.parse().ok()
}

/// Returns `true` if the payload is a well-formed probe reply.
#[inline]
#[must_use]
pub fn is_timestamp_reply(payload: &str) -> bool {
    parse_timestamp(payload).is_some()
}

/// Round-trip time from an embedded capture time, saturating at zero.
#[inline]
#[must_use]
pub fn latency_since(embedded_ms: u64, now_ms: u64) -> u64 {
    now_ms.saturating_sub(embedded_ms)
}

// ============================================================================
// Tests
// ============================================================================
