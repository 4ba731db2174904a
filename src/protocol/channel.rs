//! Channel kinds and WebSocket address handling.
//!
//! The SDK talks to two endpoints of the same server:
//!
//! | Channel | Default address | Correlation |
//! |---------|-----------------|-------------|
//! | [`Channel::Echo`] | `wss://echo.websocket.org` | FIFO reply waiters |
//! | [`Channel::Push`] | `wss://echo.websocket.org/.sse` | broadcast only |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default echo server address.
pub const DEFAULT_ECHO_URL: &str = "wss://echo.websocket.org";

/// Path segment appended to the echo address to reach the push endpoint.
pub const PUSH_PATH_SEGMENT: &str = ".sse";

/// `wss://` addresses can be opened in this build.
pub const TLS_SUPPORTED: bool = cfg!(feature = "native-tls");

// ============================================================================
// Channel
// ============================================================================

/// Which of the two connections an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Request/reply channel with correlation.
    Echo,
    /// Server push channel; no replies.
    Push,
}

impl Channel {
    /// Returns `true` if waiters may be registered on this channel.
    #[inline]
    #[must_use]
    pub const fn supports_correlation(self) -> bool {
        matches!(self, Self::Echo)
    }

    /// Lowercase name used in logs and errors.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::Push => "push",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Address Helpers
// ============================================================================

/// Parses and validates a WebSocket address.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] if the address does not parse, is not
/// `ws`/`wss`, or has no host.
pub fn parse_ws_url(address: &str) -> Result<Url> {
    let url = Url::parse(address).map_err(|e| Error::invalid_url(address, e.to_string()))?;

    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(Error::invalid_url(
                address,
                format!("unsupported scheme '{other}', expected ws or wss"),
            ));
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::invalid_url(address, "missing host"));
    }

    Ok(url)
}

/// Rejects `wss://` addresses when no TLS backend is compiled in.
///
/// # Errors
///
/// Returns [`Error::Config`] for a `wss` URL without the `native-tls` feature.
pub fn ensure_tls_support(url: &Url) -> Result<()> {
    if url.scheme() == "wss" && !TLS_SUPPORTED {
        return Err(Error::config(format!(
            "{url} needs TLS; build with the `native-tls` feature or use ws://"
        )));
    }
    Ok(())
}

/// Derives the push endpoint from an echo endpoint.
///
/// Appends [`PUSH_PATH_SEGMENT`] to the path, keeping scheme, host, port and
/// query: `wss://host/base` becomes `wss://host/base/.sse`.
#[must_use]
pub fn derive_push_url(echo: &Url) -> Url {
    let mut push = echo.clone();
    let base = echo.path().trim_end_matches('/');
    push.set_path(&format!("{base}/{PUSH_PATH_SEGMENT}"));
    push
}

// ============================================================================
// Tests
// ============================================================================
