//! Echo client module.
//!
//! This module provides the main entry point of the SDK.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`EchoClient`] | Connect, send, await replies, measure latency |
//! | [`ClientBuilder`] | Fluent configuration builder |
//! | [`ClientOptions`] | Serializable configuration |
//! | [`Status`] | Snapshot of both channels |
//! | [`WeakClient`] | Non-owning handle for use inside handlers |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for client configuration.
pub mod builder;

/// Core client implementation.
pub mod core;

/// Client configuration and defaults.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use self::core::{EchoClient, Status, WeakClient};
pub use options::ClientOptions;
