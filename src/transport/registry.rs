//! Handler registry and reply correlation.
//!
//! Every inbound message on a channel goes through [`HandlerRegistry::dispatch`]:
//!
//! 1. Pending waiters are scanned in registration order; the first whose
//!    [`ReplyMatcher`] accepts the payload is removed and resolved with it.
//! 2. If no waiter claims the payload, every permanent handler runs on it in
//!    registration order.
//!
//! Handlers run on a snapshot taken outside the lock, so a handler may
//! register handlers, send messages or disconnect without deadlocking.
//! A handler that returns `Err` or panics is logged and skipped.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::collections::VecDeque;
use std::error::Error as StdError;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, HandlerId, WaiterId};
use crate::protocol::Channel;
use crate::protocol::latency::{is_timestamp_reply, saturating_millis};

// ============================================================================
// Types
// ============================================================================

/// Outcome of a permanent handler.
pub type HandlerResult = std::result::Result<(), Box<dyn StdError + Send + Sync>>;

/// Permanent message handler callback.
///
/// Called for every inbound message that no pending waiter claims.
pub type MessageHandler = Arc<dyn Fn(&str) -> HandlerResult + Send + Sync>;

/// One-shot reply slot handed to a waiter.
type ReplySender = oneshot::Sender<Result<String>>;

// ============================================================================
// ReplyMatcher
// ============================================================================

/// Which inbound payloads a waiter will accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMatcher {
    /// The next inbound message, whatever it is.
    Any,
    /// Only `timestamp:<ms>` probe echoes; anything else falls through.
    LatencyTag,
}

impl ReplyMatcher {
    /// Returns `true` if this matcher accepts the payload.
    #[inline]
    #[must_use]
    pub fn matches(self, payload: &str) -> bool {
        match self {
            Self::Any => true,
            Self::LatencyTag => is_timestamp_reply(payload),
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// What [`HandlerRegistry::dispatch`] did with a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Consumed by a pending waiter.
    Claimed(WaiterId),
    /// Forwarded to permanent handlers.
    Broadcast {
        /// Handlers invoked.
        invoked: usize,
        /// Handlers that returned `Err` or panicked.
        failed: usize,
    },
    /// Sender is not the channel's live connection; dropped.
    Stale,
}

// ============================================================================
// Waiter
// ============================================================================

/// A one-shot subscription awaiting one inbound message.
struct Waiter {
    id: WaiterId,
    matcher: ReplyMatcher,
    reply_tx: ReplySender,
}

// ============================================================================
// HandlerRegistry
// ============================================================================

/// Mutable registry state, always accessed under the lock.
struct RegistryInner {
    /// Connection allowed to dispatch into this registry.
    owner: Option<ConnectionId>,
    /// Permanent handlers in registration order.
    handlers: Vec<(HandlerId, MessageHandler)>,
    /// Pending waiters in registration order.
    waiters: VecDeque<Waiter>,
}

/// Permanent handlers plus pending reply waiters for one channel.
///
/// Shared between the public API and the connection event loop.
pub struct HandlerRegistry {
    channel: Channel,
    max_waiters: usize,
    inner: Mutex<RegistryInner>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(channel: Channel, max_waiters: usize) -> Self {
        Self {
            channel,
            max_waiters,
            inner: Mutex::new(RegistryInner {
                owner: None,
                handlers: Vec::new(),
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Channel this registry serves.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> Channel {
        self.channel
    }

    // ------------------------------------------------------------------------
    // Ownership
    // ------------------------------------------------------------------------

    /// Sets which connection may dispatch into the registry.
    pub fn set_owner(&self, owner: Option<ConnectionId>) {
        self.inner.lock().owner = owner;
    }

    /// Returns the connection currently allowed to dispatch.
    #[must_use]
    pub fn owner(&self) -> Option<ConnectionId> {
        self.inner.lock().owner
    }

    // ------------------------------------------------------------------------
    // Permanent Handlers
    // ------------------------------------------------------------------------

    /// Appends a permanent handler.
    pub fn add_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&str) -> HandlerResult + Send + Sync + 'static,
    {
        let id = HandlerId::next();
        let handler: MessageHandler = Arc::new(handler);
        self.inner.lock().handlers.push((id, handler));
        debug!(channel = %self.channel, handler_id = %id, "Handler registered");
        id
    }

    /// Removes a permanent handler. Returns `false` if it was not registered.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.handlers.len();
        inner.handlers.retain(|(handler_id, _)| *handler_id != id);
        inner.handlers.len() != before
    }

    /// Number of permanent handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner.lock().handlers.len()
    }

    // ------------------------------------------------------------------------
    // Waiters
    // ------------------------------------------------------------------------

    /// Registers a waiter at the back of the queue.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the channel has no correlation
    /// - [`Error::Protocol`] if too many waiters are pending
    pub fn register_waiter(
        &self,
        matcher: ReplyMatcher,
    ) -> Result<(WaiterId, oneshot::Receiver<Result<String>>)> {
        if !self.channel.supports_correlation() {
            return Err(Error::protocol(format!(
                "{} channel does not support replies",
                self.channel
            )));
        }

        let mut inner = self.inner.lock();

        if inner.waiters.len() >= self.max_waiters {
            warn!(
                channel = %self.channel,
                pending = inner.waiters.len(),
                max = self.max_waiters,
                "Too many pending waiters"
            );
            return Err(Error::protocol(format!(
                "Too many pending waiters: {}/{}",
                inner.waiters.len(),
                self.max_waiters
            )));
        }

        let id = WaiterId::next();
        let (reply_tx, reply_rx) = oneshot::channel();
        inner.waiters.push_back(Waiter {
            id,
            matcher,
            reply_tx,
        });

        trace!(channel = %self.channel, waiter_id = %id, ?matcher, "Waiter registered");
        Ok((id, reply_rx))
    }

    /// Removes a waiter. Returns `false` if it was already consumed or cleared.
    pub fn remove_waiter(&self, id: WaiterId) -> bool {
        let mut inner = self.inner.lock();

        // Timed-out waiters are almost always the oldest.
        if inner.waiters.front().is_some_and(|w| w.id == id) {
            inner.waiters.pop_front();
            return true;
        }

        match inner.waiters.iter().position(|w| w.id == id) {
            Some(index) => {
                inner.waiters.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of pending waiters.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    /// Rejects every pending waiter with [`Error::ConnectionClosed`].
    ///
    /// Returns the number of waiters rejected.
    pub fn reject_waiters(&self) -> usize {
        let pending: Vec<Waiter> = self.inner.lock().waiters.drain(..).collect();
        let count = pending.len();

        for waiter in pending {
            let _ = waiter.reply_tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(channel = %self.channel, count, "Rejected pending waiters");
        }
        count
    }

    /// Drops ownership, rejects all waiters and removes all handlers.
    pub fn clear(&self) {
        let (pending, handlers) = {
            let mut inner = self.inner.lock();
            inner.owner = None;
            let pending: Vec<Waiter> = inner.waiters.drain(..).collect();
            let handlers = std::mem::take(&mut inner.handlers);
            (pending, handlers)
        };

        let rejected = pending.len();
        for waiter in pending {
            let _ = waiter.reply_tx.send(Err(Error::ConnectionClosed));
        }

        debug!(
            channel = %self.channel,
            rejected,
            handlers = handlers.len(),
            "Registry cleared"
        );
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Routes one inbound payload from connection `from`.
    pub fn dispatch(&self, from: ConnectionId, payload: &str) -> Dispatch {
        let handlers = {
            let mut inner = self.inner.lock();

            if inner.owner != Some(from) {
                trace!(channel = %self.channel, connection_id = %from, "Dropping message from stale connection");
                return Dispatch::Stale;
            }

            if let Some(index) = inner.waiters.iter().position(|w| w.matcher.matches(payload)) {
                // Position was just found, remove cannot miss.
                if let Some(waiter) = inner.waiters.remove(index) {
                    let _ = waiter.reply_tx.send(Ok(payload.to_owned()));
                    trace!(channel = %self.channel, waiter_id = %waiter.id, "Reply claimed by waiter");
                    return Dispatch::Claimed(waiter.id);
                }
            }

            inner.handlers.clone()
        };

        let mut failed = 0;
        for (id, handler) in &handlers {
            if let Err(failure) = run_handler(*id, handler, payload) {
                failed += 1;
                warn!(channel = %self.channel, error = %failure, "Message handler failed");
            }
        }

        Dispatch::Broadcast {
            invoked: handlers.len(),
            failed,
        }
    }
}

// ============================================================================
// PendingReply
// ============================================================================

/// A registered waiter together with its reply slot.
///
/// Dropping an unsettled `PendingReply` removes the waiter, so a cancelled
/// caller can never consume a later reply.
pub struct PendingReply {
    id: WaiterId,
    reply_rx: oneshot::Receiver<Result<String>>,
    registry: Arc<HandlerRegistry>,
    settled: bool,
}

impl PendingReply {
    /// Registers a waiter on `registry`.
    ///
    /// # Errors
    ///
    /// See [`HandlerRegistry::register_waiter`].
    pub fn register(registry: &Arc<HandlerRegistry>, matcher: ReplyMatcher) -> Result<Self> {
        let (id, reply_rx) = registry.register_waiter(matcher)?;
        Ok(Self {
            id,
            reply_rx,
            registry: Arc::clone(registry),
            settled: false,
        })
    }

    /// The waiter's ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> WaiterId {
        self.id
    }

    /// Withdraws the waiter without waiting.
    pub fn cancel(mut self) {
        self.settled = true;
        self.registry.remove_waiter(self.id);
    }

    /// Waits for the reply, bounded by `reply_timeout`.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if nothing matched in time
    /// - [`Error::ConnectionClosed`] if the waiter was rejected or dropped
    pub async fn wait(mut self, reply_timeout: Duration, operation: &str) -> Result<String> {
        let outcome = timeout(reply_timeout, &mut self.reply_rx).await;
        self.settled = true;

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                if self.registry.remove_waiter(self.id) {
                    let timeout_ms = saturating_millis(reply_timeout);
                    debug!(waiter_id = %self.id, timeout_ms, "Waiter timed out");
                    return Err(Error::timeout(operation, timeout_ms));
                }

                // Settled in the same instant the timer fired; the reply wins.
                self.reply_rx
                    .try_recv()
                    .unwrap_or(Err(Error::ConnectionClosed))
            }
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if !self.settled {
            self.registry.remove_waiter(self.id);
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Runs one handler, converting `Err` and panics into [`Error::HandlerFailure`].
fn run_handler(id: HandlerId, handler: &MessageHandler, payload: &str) -> Result<()> {
    match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::handler_failure(id, e.to_string())),
        Err(panic) => Err(Error::handler_failure(id, panic_message(&*panic))),
    }
}

/// Best-effort text of a panic payload.
fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
