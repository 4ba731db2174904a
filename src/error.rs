//! Error types for the echo-socket SDK.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use echo_socket::{EchoClient, Result};
//!
//! async fn example(client: &EchoClient) -> Result<()> {
//!     client.connect("ws://127.0.0.1:9001").await?;
//!     let reply = client.send_message_and_wait_default("hello").await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidUrl`] |
//! | Connection | [`Error::NotConnected`], [`Error::ConnectFailed`], [`Error::ConnectSuperseded`], [`Error::ConnectionClosed`] |
//! | Correlation | [`Error::Timeout`], [`Error::Protocol`] |
//! | Dispatch | [`Error::HandlerFailure`] |
//! | Serialization | [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

use crate::identifiers::HandlerId;
use crate::protocol::Channel;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Address is not a usable WebSocket URL.
    #[error("Invalid WebSocket URL '{url}': {message}")]
    InvalidUrl {
        /// The rejected address.
        url: String,
        /// Why it was rejected.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Operation attempted with no open connection on the channel.
    #[error("{channel} channel is not connected")]
    NotConnected {
        /// Channel the operation targeted.
        channel: Channel,
    },

    /// Handshake or transport failure while connecting.
    #[error("Connection to {url} failed: {message}")]
    ConnectFailed {
        /// Address being connected to.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// A later `connect` call replaced this one before it completed.
    ///
    /// The socket this attempt opened (if any) has been discarded.
    #[error("Connection to {url} superseded by a newer connect")]
    ConnectSuperseded {
        /// Address of the superseded attempt.
        url: String,
    },

    /// Connection closed while the operation was outstanding.
    ///
    /// Returned to pending waiters on `disconnect()` and on remote close.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Correlation Errors
    // ========================================================================
    /// No qualifying reply within the configured window.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Protocol violation or resource limit.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the violation.
        message: String,
    },

    // ========================================================================
    // Dispatch Errors
    // ========================================================================
    /// A permanent handler failed.
    ///
    /// Only ever logged at the dispatch boundary; never returned to callers
    /// of other operations.
    #[error("Handler {handler_id} failed: {message}")]
    HandlerFailure {
        /// The failing handler.
        handler_id: HandlerId,
        /// Error or panic message.
        message: String,
    },

    // ========================================================================
    // Serialization Errors
    // ========================================================================
    /// JSON error from options loading or `print`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid URL error.
    #[inline]
    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a not connected error.
    #[inline]
    pub fn not_connected(channel: Channel) -> Self {
        Self::NotConnected { channel }
    }

    /// Creates a connect failed error.
    #[inline]
    pub fn connect_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a connect superseded error.
    #[inline]
    pub fn connect_superseded(url: impl Into<String>) -> Self {
        Self::ConnectSuperseded { url: url.into() }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a handler failure error.
    #[inline]
    pub fn handler_failure(handler_id: HandlerId, message: impl Into<String>) -> Self {
        Self::HandlerFailure {
            handler_id,
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::NotConnected { .. }
                | Self::ConnectFailed { .. }
                | Self::ConnectSuperseded { .. }
                | Self::ConnectionClosed
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry (possibly after reconnecting).
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::NotConnected { .. }
                | Self::ConnectFailed { .. }
                | Self::ConnectionClosed
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
