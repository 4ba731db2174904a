//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`EchoClient`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use echo_socket::EchoClient;
//!
//! # fn example() -> echo_socket::Result<()> {
//! let client = EchoClient::builder()
//!     .default_url("ws://127.0.0.1:9001")
//!     .reply_timeout(Duration::from_secs(2))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::Result;

use super::core::EchoClient;
use super::options::ClientOptions;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring an [`EchoClient`] instance.
///
/// Use [`EchoClient::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct ClientBuilder {
    options: ClientOptions,
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the echo address used by `connect_default`.
    #[inline]
    #[must_use]
    pub fn default_url(mut self, url: impl Into<String>) -> Self {
        self.options = self.options.with_default_url(url);
        self
    }

    /// Overrides the derived push address.
    #[inline]
    #[must_use]
    pub fn push_url(mut self, url: impl Into<String>) -> Self {
        self.options = self.options.with_push_url(url);
        self
    }

    /// Sets the default reply timeout.
    #[inline]
    #[must_use]
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_reply_timeout(timeout);
        self
    }

    /// Sets the latency probe timeout.
    #[inline]
    #[must_use]
    pub fn latency_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_latency_timeout(timeout);
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_connect_timeout(timeout);
        self
    }

    /// Sets the close wait used when replacing a connection.
    #[inline]
    #[must_use]
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_close_timeout(timeout);
        self
    }

    /// Sets the pending waiter cap.
    #[inline]
    #[must_use]
    pub fn max_pending_waiters(mut self, max: usize) -> Self {
        self.options = self.options.with_max_pending_waiters(max);
        self
    }

    /// Builds the client with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`](crate::Error::InvalidUrl) if an address is not `ws`/`wss`
    /// - [`Error::Config`](crate::Error::Config) if a limit is zero
    pub fn build(self) -> Result<EchoClient> {
        let (echo_url, push_url) = self.options.validate()?;
        Ok(EchoClient::new(self.options, echo_url, push_url))
    }
}

// ============================================================================
// Tests
// ============================================================================
