//! Client configuration.
//!
//! [`ClientOptions`] is plain data: fluent `with_*` setters for code, serde
//! for loading from JSON. Validation happens in [`validate`](ClientOptions::validate),
//! which [`ClientBuilder::build`](super::ClientBuilder::build) calls.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use echo_socket::ClientOptions;
//!
//! let options = ClientOptions::new()
//!     .with_default_url("ws://127.0.0.1:9001")
//!     .with_reply_timeout(Duration::from_secs(2));
//!
//! let json = r#"{ "defaultUrl": "ws://127.0.0.1:9001", "latencyTimeoutMs": 1000 }"#;
//! let loaded = ClientOptions::from_json(json)?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{DEFAULT_ECHO_URL, derive_push_url, parse_ws_url, saturating_millis};
use crate::transport::ChannelConfig;

// ============================================================================
// Constants
// ============================================================================

/// Default wait for a reply (5s, as the block runtime expects).
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Fixed wait for a latency probe echo.
pub const DEFAULT_LATENCY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Default WebSocket handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default wait for a replaced connection to finish closing.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum pending waiters before rejecting new ones.
pub const DEFAULT_MAX_PENDING_WAITERS: usize = 100;

// ============================================================================
// ClientOptions
// ============================================================================

/// SDK configuration.
///
/// Durations are stored in milliseconds so the JSON form stays flat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientOptions {
    /// Echo address used by `connect_default`.
    pub default_url: String,

    /// Push address; derived from `default_url` when `None`.
    pub push_url: Option<String>,

    /// Wait used by `send_message_and_wait_default`.
    pub reply_timeout_ms: u64,

    /// Wait used by `measure_latency`.
    pub latency_timeout_ms: u64,

    /// WebSocket handshake limit.
    pub connect_timeout_ms: u64,

    /// Limit on waiting for a replaced connection to close.
    pub close_timeout_ms: u64,

    /// Outstanding waiter cap per channel.
    pub max_pending_waiters: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_url: DEFAULT_ECHO_URL.to_string(),
            push_url: None,
            reply_timeout_ms: saturating_millis(DEFAULT_REPLY_TIMEOUT),
            latency_timeout_ms: saturating_millis(DEFAULT_LATENCY_TIMEOUT),
            connect_timeout_ms: saturating_millis(DEFAULT_CONNECT_TIMEOUT),
            close_timeout_ms: saturating_millis(DEFAULT_CLOSE_TIMEOUT),
            max_pending_waiters: DEFAULT_MAX_PENDING_WAITERS,
        }
    }

    /// Parses options from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the document is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientOptions {
    /// Sets the default echo address.
    #[inline]
    #[must_use]
    pub fn with_default_url(mut self, url: impl Into<String>) -> Self {
        self.default_url = url.into();
        self
    }

    /// Overrides the push address.
    #[inline]
    #[must_use]
    pub fn with_push_url(mut self, url: impl Into<String>) -> Self {
        self.push_url = Some(url.into());
        self
    }

    /// Sets the default reply timeout.
    #[inline]
    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout_ms = saturating_millis(timeout);
        self
    }

    /// Sets the latency probe timeout.
    #[inline]
    #[must_use]
    pub fn with_latency_timeout(mut self, timeout: Duration) -> Self {
        self.latency_timeout_ms = saturating_millis(timeout);
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = saturating_millis(timeout);
        self
    }

    /// Sets the close wait used when replacing a connection.
    #[inline]
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout_ms = saturating_millis(timeout);
        self
    }

    /// Sets the pending waiter cap.
    #[inline]
    #[must_use]
    pub fn with_max_pending_waiters(mut self, max: usize) -> Self {
        self.max_pending_waiters = max;
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl ClientOptions {
    /// Default reply timeout.
    #[inline]
    #[must_use]
    pub const fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    /// Latency probe timeout.
    #[inline]
    #[must_use]
    pub const fn latency_timeout(&self) -> Duration {
        Duration::from_millis(self.latency_timeout_ms)
    }

    /// Per-channel transport limits.
    #[must_use]
    pub const fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            close_timeout: Duration::from_millis(self.close_timeout_ms),
            max_pending_waiters: self.max_pending_waiters,
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientOptions {
    /// Validates the options and resolves both addresses.
    ///
    /// Returns `(echo_url, push_url)`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] if an address is not a `ws`/`wss` URL
    /// - [`Error::Config`] if a timeout or the waiter cap is zero
    pub fn validate(&self) -> Result<(Url, Url)> {
        let checks = [
            ("reply_timeout_ms", self.reply_timeout_ms),
            ("latency_timeout_ms", self.latency_timeout_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("close_timeout_ms", self.close_timeout_ms),
        ];

        if let Some((name, _)) = checks.iter().find(|(_, value)| *value == 0) {
            return Err(Error::config(format!("{name} must be greater than zero")));
        }

        if self.max_pending_waiters == 0 {
            return Err(Error::config(
                "max_pending_waiters must be greater than zero",
            ));
        }

        let echo = parse_ws_url(&self.default_url)?;
        let push = match &self.push_url {
            Some(url) => parse_ws_url(url)?,
            None => derive_push_url(&echo),
        };

        Ok((echo, push))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_default() {
        let options = ClientOptions::new();
        assert_eq!(options.default_url, DEFAULT_ECHO_URL);
        assert!(options.push_url.is_none());
        assert_eq!(options.reply_timeout(), Duration::from_secs(5));
        assert_eq!(options.latency_timeout(), Duration::from_secs(5));
        assert_eq!(options.max_pending_waiters, 100);
        assert_eq!(options, ClientOptions::default());
    }

    #[test]
    fn test_builder_chain() {
        let options = ClientOptions::new()
            .with_default_url("ws://127.0.0.1:9001")
            .with_push_url("ws://127.0.0.1:9002/events")
            .with_reply_timeout(Duration::from_millis(250))
            .with_latency_timeout(Duration::from_millis(750))
            .with_connect_timeout(Duration::from_secs(1))
            .with_close_timeout(Duration::from_millis(100))
            .with_max_pending_waiters(8);

        assert_eq!(options.reply_timeout_ms, 250);
        assert_eq!(options.latency_timeout_ms, 750);

        let config = options.channel_config();
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.close_timeout, Duration::from_millis(100));
        assert_eq!(config.max_pending_waiters, 8);
    }

    #[test]
    fn test_huge_durations_clamp() {
        let options = ClientOptions::new()
            .with_reply_timeout(Duration::MAX)
            .with_latency_timeout(Duration::MAX);

        assert_eq!(options.reply_timeout_ms, u64::MAX);
        assert_eq!(options.latency_timeout_ms, u64::MAX);
    }

    #[test]
    fn test_validate_derives_push_url() {
        let (echo, push) = ClientOptions::new().validate().unwrap();
        assert_eq!(echo.as_str(), "wss://echo.websocket.org/");
        assert_eq!(push.as_str(), "wss://echo.websocket.org/.sse");
    }

    #[test]
    fn test_validate_uses_explicit_push_url() {
        let (_, push) = ClientOptions::new()
            .with_push_url("ws://127.0.0.1:9002/events")
            .validate()
            .unwrap();
        assert_eq!(push.as_str(), "ws://127.0.0.1:9002/events");
    }

    #[test]
    fn test_validate_zero_timeout() {
        let err = ClientOptions::new()
            .with_reply_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("reply_timeout_ms"));
    }

    #[test]
    fn test_validate_zero_waiters() {
        let err = ClientOptions::new()
            .with_max_pending_waiters(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_validate_bad_url() {
        let err = ClientOptions::new()
            .with_default_url("http://example.com")
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));
    }

    #[test]
    fn test_from_json_partial() {
        let options =
            ClientOptions::from_json(r#"{ "defaultUrl": "ws://localhost:1", "latencyTimeoutMs": 900 }"#)
                .unwrap();
        assert_eq!(options.default_url, "ws://localhost:1");
        assert_eq!(options.latency_timeout_ms, 900);
        assert_eq!(options.reply_timeout_ms, 5_000);
    }

    #[test]
    fn test_from_json_malformed() {
        assert!(matches!(
            ClientOptions::from_json("{"),
            Err(Error::Json(_))
        ));
    }
}
