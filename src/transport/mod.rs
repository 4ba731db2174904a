//! WebSocket transport layer.
//!
//! This module owns the sockets, the per-channel lifecycle and the
//! request/reply correlation engine.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐                      ┌───────────────┐
//! │ EchoClient                   │                      │  Echo server  │
//! │  ├─ ChannelTransport (echo) ─┼──── WebSocket ──────►│               │
//! │  │    ├─ Connection          │                      │   /           │
//! │  │    └─ HandlerRegistry     │                      │               │
//! │  └─ ChannelTransport (push) ─┼──── WebSocket ◄──────│   /.sse       │
//! │       ├─ Connection          │                      │               │
//! │       └─ HandlerRegistry     │                      └───────────────┘
//! └──────────────────────────────┘
//! ```
//!
//! # Dependency Order
//!
//! `state` → `registry` → `connection` → `channel`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `state` | Connection state machine |
//! | `registry` | Permanent handlers, pending waiters, dispatch |
//! | `connection` | One socket and its event loop |
//! | `channel` | Connect / disconnect / send for one channel |

// ============================================================================
// Submodules
// ============================================================================

/// Connection lifecycle for one channel.
pub mod channel;

/// WebSocket connection and event loop.
pub mod connection;

/// Handler registry and reply correlation.
pub mod registry;

/// Connection state machine.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{ChannelConfig, ChannelTransport, ConnectAck, SendAck};
pub use connection::Connection;
pub use registry::{
    Dispatch, HandlerRegistry, HandlerResult, MessageHandler, PendingReply, ReplyMatcher,
};
pub use state::ConnectionState;
