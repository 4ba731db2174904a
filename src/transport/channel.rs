//! Connection lifecycle for one channel.
//!
//! A [`ChannelTransport`] owns at most one live [`Connection`] and the
//! channel's [`HandlerRegistry`]. It serializes connects by generation:
//!
//! ```text
//! connect(a) ──► id=1, Connecting ──────────── handshake ok ──► id 1 != pending ──► ConnectSuperseded
//! connect(b) ──────► close attempt 1, id=2, Connecting ── handshake ok ──► Open (conn 2)
//! ```
//!
//! Lock order is always slot, then registry. No lock is held across `.await`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::{Channel, ensure_tls_support};

use super::connection::{Connection, LostCallback};
use super::registry::{HandlerRegistry, PendingReply, ReplyMatcher};
use super::state::ConnectionState;

// ============================================================================
// ChannelConfig
// ============================================================================

/// Timing and capacity limits for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Maximum time for the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Maximum time to wait for a replaced connection to finish closing.
    pub close_timeout: Duration,
    /// Maximum outstanding reply waiters.
    pub max_pending_waiters: usize,
}

// ============================================================================
// Acknowledgements
// ============================================================================

/// Successful connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectAck {
    /// Channel that connected.
    pub channel: Channel,
    /// ID of the new connection.
    pub connection_id: ConnectionId,
    /// Address connected to.
    pub url: String,
}

/// Message accepted for sending. Not a delivery receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAck {
    /// Payload size in bytes.
    pub bytes: usize,
}

// ============================================================================
// Slot
// ============================================================================

/// Why a live or pending connection is being retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retire {
    /// Explicit disconnect: waiters rejected, handlers removed.
    Disconnect,
    /// Replaced by a newer connect. A cancelled handshake keeps the handlers.
    Replace,
}

/// Lifecycle state guarded by the channel lock.
#[derive(Default)]
struct Slot {
    /// Current state.
    state: ConnectionState,
    /// Connect attempt in flight, if any.
    pending: Option<ConnectionId>,
    /// Live connection, if any.
    connection: Option<Connection>,
}

// ============================================================================
// ChannelTransport
// ============================================================================

/// Lifecycle owner for one channel's connection.
pub struct ChannelTransport {
    channel: Channel,
    config: ChannelConfig,
    registry: Arc<HandlerRegistry>,
    slot: Mutex<Slot>,
}

impl fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelTransport")
            .field("channel", &self.channel)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ChannelTransport {
    /// Creates an idle channel.
    #[must_use]
    pub fn new(channel: Channel, config: ChannelConfig) -> Arc<Self> {
        Arc::new(Self {
            channel,
            config,
            registry: Arc::new(HandlerRegistry::new(channel, config.max_pending_waiters)),
            slot: Mutex::new(Slot::default()),
        })
    }

    /// Channel served.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Handler registry for this channel.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.slot.lock().state
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Opens a connection, replacing any live one.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `url` is `wss://` and no TLS backend is built in
    /// - [`Error::ConnectFailed`] if the handshake fails
    /// - [`Error::ConnectSuperseded`] if another connect or a disconnect
    ///   happened before the handshake finished
    pub async fn connect(self: &Arc<Self>, url: Url) -> Result<ConnectAck> {
        ensure_tls_support(&url)?;
        let id = ConnectionId::next();

        let previous = {
            let mut slot = self.slot.lock();
            let previous = self.retire_locked(&mut slot, Retire::Replace);
            slot.pending = Some(id);
            self.transition(&mut slot, ConnectionState::Connecting);
            previous
        };

        if let Some(old) = previous {
            debug!(channel = %self.channel, connection_id = %old.id(), "Waiting for previous connection to close");
            old.shutdown();
            old.closed(self.config.close_timeout).await;
        }

        let outcome = Connection::handshake(&url, self.config.connect_timeout).await;

        let mut slot = self.slot.lock();

        if slot.pending != Some(id) {
            drop(slot);
            debug!(channel = %self.channel, connection_id = %id, url = %url, "Connect superseded");
            if let Ok(mut stream) = outcome {
                tokio::spawn(async move {
                    let _ = stream.close(None).await;
                });
            }
            return Err(Error::connect_superseded(url.as_str()));
        }

        slot.pending = None;

        match outcome {
            Ok(stream) => {
                // Owner first: the loop may read a frame as soon as it starts.
                self.registry.set_owner(Some(id));
                let connection = Connection::spawn(
                    id,
                    self.channel,
                    url.clone(),
                    stream,
                    Arc::clone(&self.registry),
                    self.lost_callback(),
                );
                slot.connection = Some(connection);
                self.transition(&mut slot, ConnectionState::Open);

                Ok(ConnectAck {
                    channel: self.channel,
                    connection_id: id,
                    url: url.to_string(),
                })
            }
            Err(e) => {
                self.transition(&mut slot, ConnectionState::Closed);
                warn!(channel = %self.channel, url = %url, error = %e, "Connect failed");
                Err(e)
            }
        }
    }

    /// Closes the live connection or cancels an in-flight connect.
    ///
    /// Idempotent. Every pending waiter is rejected with
    /// [`Error::ConnectionClosed`] and every handler is removed before this
    /// returns.
    pub fn disconnect(&self) {
        let retired = {
            let mut slot = self.slot.lock();
            self.retire_locked(&mut slot, Retire::Disconnect)
        };

        if let Some(connection) = retired {
            connection.shutdown();
        }
    }

    /// Called by the event loop when the remote end goes away.
    fn connection_lost(&self, id: ConnectionId) {
        let mut slot = self.slot.lock();

        if slot.connection.as_ref().map(Connection::id) != Some(id) {
            return;
        }

        slot.connection = None;
        self.registry.set_owner(None);
        self.transition(&mut slot, ConnectionState::Closed);
        drop(slot);

        let rejected = self.registry.reject_waiters();
        info!(channel = %self.channel, connection_id = %id, rejected, "Connection lost");
    }

    /// Builds the event loop's lost-connection hook.
    ///
    /// Holds the channel weakly so dropping the client still tears down.
    fn lost_callback(self: &Arc<Self>) -> LostCallback {
        let weak: Weak<Self> = Arc::downgrade(self);
        Box::new(move |id| {
            if let Some(transport) = weak.upgrade() {
                transport.connection_lost(id);
            }
        })
    }

    /// Moves a live or pending connection to Closed.
    ///
    /// Waiters are always rejected. Handlers are removed unless a newer
    /// connect is only cancelling a handshake that never opened.
    ///
    /// Returns the retired connection so the caller can shut it down
    /// outside the lock.
    fn retire_locked(&self, slot: &mut Slot, reason: Retire) -> Option<Connection> {
        let connection = slot.connection.take();
        let cancelled = slot.pending.take();

        if connection.is_none() && cancelled.is_none() {
            return None;
        }

        self.transition(slot, ConnectionState::Closing);
        if connection.is_none() && reason == Retire::Replace {
            self.registry.set_owner(None);
            self.registry.reject_waiters();
        } else {
            self.registry.clear();
        }
        self.transition(slot, ConnectionState::Closed);

        match (&connection, cancelled) {
            (Some(c), _) => info!(channel = %self.channel, connection_id = %c.id(), "Connection closed"),
            (None, Some(id)) => info!(channel = %self.channel, connection_id = %id, "Connect cancelled"),
            (None, None) => {}
        }

        connection
    }

    /// Applies a state change if legal.
    fn transition(&self, slot: &mut Slot, next: ConnectionState) {
        if !slot.state.can_transition_to(next) {
            warn!(channel = %self.channel, from = %slot.state, to = %next, "Illegal state transition ignored");
            return;
        }

        debug!(channel = %self.channel, from = %slot.state, to = %next, "State transition");
        slot.state = next;
    }

    // ------------------------------------------------------------------------
    // Messaging
    // ------------------------------------------------------------------------

    /// Queues a message without waiting for a reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if the channel is not open.
    pub fn send(&self, text: String) -> Result<SendAck> {
        let slot = self.slot.lock();
        let connection = Self::open_connection(&slot, self.channel)?;

        let bytes = text.len();
        connection.send_text(text)?;
        debug!(channel = %self.channel, bytes, "Message queued");

        Ok(SendAck { bytes })
    }

    /// Registers a waiter, then queues the message.
    ///
    /// Both happen under the channel lock, so a concurrent disconnect
    /// either sees the waiter (and rejects it) or runs before it exists.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the channel is not open (no waiter created)
    /// - [`Error::Protocol`] if the channel has no correlation or too many
    ///   waiters are pending
    pub fn request(&self, text: String, matcher: ReplyMatcher) -> Result<PendingReply> {
        let slot = self.slot.lock();
        let connection = Self::open_connection(&slot, self.channel)?;

        let pending = PendingReply::register(&self.registry, matcher)?;

        if let Err(e) = connection.send_text(text) {
            pending.cancel();
            return Err(e);
        }

        debug!(channel = %self.channel, waiter_id = %pending.id(), ?matcher, "Request sent");
        Ok(pending)
    }

    /// Returns the live connection if the channel is open.
    fn open_connection(slot: &Slot, channel: Channel) -> Result<&Connection> {
        match (&slot.connection, slot.state) {
            (Some(connection), ConnectionState::Open) => Ok(connection),
            _ => Err(Error::not_connected(channel)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
