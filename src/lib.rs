//! echo-socket - WebSocket client SDK with reply correlation.
//!
//! This library drives one *echo channel* (send, await the correlated reply,
//! probe round-trip latency) and one read-only *push channel* on behalf of
//! generated scripts.
//!
//! # Architecture
//!
//! - **Echo channel**: every request registers a one-shot waiter; the next
//!   qualifying inbound message settles it, in FIFO order. Unclaimed
//!   messages go to permanent handlers.
//! - **Push channel**: every inbound message goes to permanent handlers.
//!
//! Key design principles:
//!
//! - Each [`EchoClient`] is an explicit instance; no global state
//! - At most one live connection per channel; reconnect replaces it
//! - Every awaited operation settles exactly once: reply, timeout, or close
//! - Handler failures are logged, never propagated
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use echo_socket::{EchoClient, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = EchoClient::builder()
//!         .default_url("ws://127.0.0.1:9001")
//!         .build()?;
//!
//!     client.connect_default().await?;
//!
//!     let reply = client
//!         .send_message_and_wait("ping", Duration::from_secs(1))
//!         .await?;
//!     println!("reply: {reply}");
//!
//!     let latency = client.measure_latency().await?;
//!     println!("latency: {latency}ms");
//!
//!     client.disconnect_all();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`EchoClient`], builder and options |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Channel kinds and the latency tag |
//! | [`transport`] | Connections, lifecycle, correlation (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Client entry point.
///
/// Use [`EchoClient::builder()`] to create a configured instance.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Wire conventions.
pub mod protocol;

/// WebSocket transport layer.
///
/// Handles sockets, connection lifecycle and reply correlation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{ClientBuilder, ClientOptions, EchoClient, Status, WeakClient};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ClientId, ConnectionId, HandlerId, WaiterId};

// Protocol types
pub use protocol::Channel;

// Transport types
pub use transport::{ConnectAck, ConnectionState, HandlerResult, SendAck};
