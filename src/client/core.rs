//! Echo client: the public operation surface.
//!
//! [`EchoClient`] is a cheap, cloneable handle. Create one per script run and
//! pass clones to whatever needs it; there is no global instance.
//!
//! Handlers that call back into the client must capture a [`WeakClient`]
//! from [`EchoClient::downgrade`]. A captured clone would keep the client,
//! and its sockets, alive after every user handle is gone.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use echo_socket::EchoClient;
//!
//! # async fn example() -> echo_socket::Result<()> {
//! let client = EchoClient::builder().default_url("ws://127.0.0.1:9001").build()?;
//!
//! client.on_message(|text| {
//!     println!("unsolicited: {text}");
//!     Ok(())
//! });
//!
//! client.connect_default().await?;
//! let reply = client
//!     .send_message_and_wait("hello", Duration::from_secs(1))
//!     .await?;
//! let rtt_ms = client.measure_latency().await?;
//! println!("{reply} in {rtt_ms}ms");
//!
//! client.disconnect();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{ClientId, HandlerId};
use crate::protocol::latency::latency_since;
use crate::protocol::{Channel, encode_timestamp, now_ms, parse_timestamp, parse_ws_url};
use crate::transport::{
    ChannelTransport, ConnectAck, ConnectionState, HandlerResult, ReplyMatcher, SendAck,
};

use super::builder::ClientBuilder;
use super::options::ClientOptions;

// ============================================================================
// Status
// ============================================================================

/// Snapshot of both channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Echo channel is open.
    pub echo_connected: bool,
    /// Push channel is open.
    pub push_connected: bool,
    /// Echo channel state.
    pub echo_state: ConnectionState,
    /// Push channel state.
    pub push_state: ConnectionState,
}

// ============================================================================
// Types
// ============================================================================

/// Receives the text produced by [`EchoClient::print`].
type PrintHook = Arc<dyn Fn(&str) -> HandlerResult + Send + Sync>;

/// Internal shared state for a client.
pub(crate) struct ClientInner {
    /// Identifies this instance in logs.
    id: ClientId,
    /// Options the client was built with.
    options: ClientOptions,
    /// Resolved echo address for `connect_default`.
    echo_url: Url,
    /// Resolved push address.
    push_url: Url,
    /// Echo channel (correlated).
    echo: Arc<ChannelTransport>,
    /// Push channel (broadcast only).
    push: Arc<ChannelTransport>,
    /// Output hook for `print`.
    print_hook: Mutex<Option<PrintHook>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.echo.disconnect();
        self.push.disconnect();
        debug!(client_id = %self.id, "Client dropped");
    }
}

// ============================================================================
// EchoClient
// ============================================================================

/// WebSocket SDK instance with an echo channel and a push channel.
///
/// Cloning yields another handle to the same connections and handlers.
/// Connections close when the last handle is dropped. Clones captured by
/// registered handlers count as handles; capture a [`WeakClient`] instead.
#[derive(Clone)]
pub struct EchoClient {
    /// Shared inner state.
    pub(crate) inner: Arc<ClientInner>,
}

/// Non-owning handle to an [`EchoClient`].
///
/// Does not keep connections open. Capture this in handlers that send,
/// disconnect or register further handlers.
#[derive(Clone)]
pub struct WeakClient {
    inner: Weak<ClientInner>,
}

impl WeakClient {
    /// Returns the client if any [`EchoClient`] handle is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<EchoClient> {
        self.inner.upgrade().map(|inner| EchoClient { inner })
    }
}

impl fmt::Debug for WeakClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakClient")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

// ============================================================================
// EchoClient - Display
// ============================================================================

impl fmt::Debug for EchoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EchoClient")
            .field("id", &self.inner.id)
            .field("echo_url", &self.inner.echo_url.as_str())
            .field("push_url", &self.inner.push_url.as_str())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// EchoClient - Constructor
// ============================================================================

impl EchoClient {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client from validated options.
    pub(crate) fn new(options: ClientOptions, echo_url: Url, push_url: Url) -> Self {
        let config = options.channel_config();
        let id = ClientId::generate();

        debug!(client_id = %id, echo_url = %echo_url, push_url = %push_url, "Client created");

        Self {
            inner: Arc::new(ClientInner {
                id,
                options,
                echo_url,
                push_url,
                echo: ChannelTransport::new(Channel::Echo, config),
                push: ChannelTransport::new(Channel::Push, config),
                print_hook: Mutex::new(None),
            }),
        }
    }

    /// Creates a handle that does not keep the client alive.
    #[inline]
    #[must_use]
    pub fn downgrade(&self) -> WeakClient {
        WeakClient {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Returns this instance's ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ClientId {
        self.inner.id
    }

    /// Returns the options the client was built with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Returns the resolved default echo address.
    #[inline]
    #[must_use]
    pub fn echo_url(&self) -> &Url {
        &self.inner.echo_url
    }

    /// Returns the resolved push address.
    #[inline]
    #[must_use]
    pub fn push_url(&self) -> &Url {
        &self.inner.push_url
    }
}

// ============================================================================
// EchoClient - Lifecycle
// ============================================================================

impl EchoClient {
    /// Connects the echo channel to `address`.
    ///
    /// Closes any live echo connection first (same effect as
    /// [`disconnect`](Self::disconnect)). Resolves once the connection is
    /// open or has failed.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] if `address` is not a `ws`/`wss` URL
    /// - [`Error::ConnectFailed`] if the handshake fails or times out
    /// - [`Error::ConnectSuperseded`] if a newer connect or a disconnect
    ///   happened before this one finished
    pub async fn connect(&self, address: &str) -> Result<ConnectAck> {
        let url = parse_ws_url(address)?;
        self.inner.echo.connect(url).await
    }

    /// Connects the echo channel to the configured default address.
    ///
    /// # Errors
    ///
    /// See [`connect`](Self::connect).
    pub async fn connect_default(&self) -> Result<ConnectAck> {
        self.inner.echo.connect(self.inner.echo_url.clone()).await
    }

    /// Connects the echo channel, then runs `on_connected` once.
    ///
    /// A failing or panicking callback is logged and does not change the
    /// result.
    ///
    /// # Errors
    ///
    /// See [`connect`](Self::connect). The callback is not run on error.
    pub async fn connect_with_callback<F>(&self, address: &str, on_connected: F) -> Result<ConnectAck>
    where
        F: FnOnce(&ConnectAck) -> HandlerResult,
    {
        let ack = self.connect(address).await?;
        self.run_callback("on_connected", || on_connected(&ack));
        Ok(ack)
    }

    /// Connects the push channel to the configured push address.
    ///
    /// # Errors
    ///
    /// See [`connect`](Self::connect).
    pub async fn connect_push(&self) -> Result<ConnectAck> {
        self.inner.push.connect(self.inner.push_url.clone()).await
    }

    /// Closes the echo channel.
    ///
    /// Idempotent. Pending waiters are rejected with
    /// [`Error::ConnectionClosed`] and all echo handlers are removed before
    /// this returns.
    pub fn disconnect(&self) {
        self.inner.echo.disconnect();
    }

    /// Closes the push channel and removes all push handlers. Idempotent.
    pub fn disconnect_push(&self) {
        self.inner.push.disconnect();
    }

    /// Closes both channels.
    pub fn disconnect_all(&self) {
        self.disconnect();
        self.disconnect_push();
        info!(client_id = %self.inner.id, "All connections closed");
    }

    /// Returns the state of both channels. Never blocks on I/O.
    #[must_use]
    pub fn status(&self) -> Status {
        let echo_state = self.inner.echo.state();
        let push_state = self.inner.push.state();

        Status {
            echo_connected: echo_state.is_open(),
            push_connected: push_state.is_open(),
            echo_state,
            push_state,
        }
    }
}

// ============================================================================
// EchoClient - Messaging
// ============================================================================

impl EchoClient {
    /// Sends a message on the echo channel without waiting for a reply.
    ///
    /// The acknowledgement means the message was queued, not delivered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if the echo channel is not open.
    pub fn send_message(&self, message: impl Into<String>) -> Result<SendAck> {
        self.inner.echo.send(message.into())
    }

    /// Sends a message and waits for the next inbound echo-channel message.
    ///
    /// Concurrent calls are answered in the order they were made.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the echo channel is not open
    /// - [`Error::Timeout`] if nothing arrives within `timeout`
    /// - [`Error::ConnectionClosed`] if the channel closes first
    /// - [`Error::Protocol`] if too many waiters are pending
    pub async fn send_message_and_wait(
        &self,
        message: impl Into<String>,
        timeout: Duration,
    ) -> Result<String> {
        let pending = self.inner.echo.request(message.into(), ReplyMatcher::Any)?;
        pending.wait(timeout, "send_message_and_wait").await
    }

    /// [`send_message_and_wait`](Self::send_message_and_wait) with the
    /// configured default timeout.
    ///
    /// # Errors
    ///
    /// See [`send_message_and_wait`](Self::send_message_and_wait).
    pub async fn send_message_and_wait_default(&self, message: impl Into<String>) -> Result<String> {
        self.send_message_and_wait(message, self.inner.options.reply_timeout())
            .await
    }

    /// Measures round-trip latency in milliseconds.
    ///
    /// Sends `timestamp:<now>` and waits for a `timestamp:` echo. Untagged
    /// messages arriving meanwhile are left for other waiters and handlers.
    /// The wait is the configured latency timeout, not per call.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the echo channel is not open
    /// - [`Error::Timeout`] if no tagged echo arrives in time
    /// - [`Error::ConnectionClosed`] if the channel closes first
    pub async fn measure_latency(&self) -> Result<u64> {
        let sent_at = now_ms();
        let pending = self
            .inner
            .echo
            .request(encode_timestamp(sent_at), ReplyMatcher::LatencyTag)?;

        let reply = pending
            .wait(self.inner.options.latency_timeout(), "measure_latency")
            .await?;

        let embedded = parse_timestamp(&reply)
            .ok_or_else(|| Error::protocol(format!("untagged latency reply: {reply}")))?;
        let latency = latency_since(embedded, now_ms());

        debug!(client_id = %self.inner.id, latency_ms = latency, "Latency measured");
        Ok(latency)
    }

    /// Number of replies currently awaited on the echo channel.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.echo.registry().pending_count()
    }

    /// Pauses the calling task.
    pub async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Renders `data` for display and forwards it to the print hook.
    ///
    /// Strings print as-is, objects and arrays as indented JSON, other
    /// values in their JSON form. Returns the rendered text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if `data` cannot be represented as JSON.
    pub fn print<T>(&self, data: &T) -> Result<String>
    where
        T: Serialize + ?Sized,
    {
        let output = render_printable(&serde_json::to_value(data)?)?;
        info!(client_id = %self.inner.id, %output, "Print");

        let hook = self.inner.print_hook.lock().clone();
        if let Some(hook) = hook {
            self.run_callback("on_print", || hook(&output));
        }

        Ok(output)
    }

    /// Sets the hook that receives [`print`](Self::print) output, replacing
    /// any previous one.
    pub fn on_print<F>(&self, hook: F)
    where
        F: Fn(&str) -> HandlerResult + Send + Sync + 'static,
    {
        *self.inner.print_hook.lock() = Some(Arc::new(hook));
    }

    /// Runs a user callback, logging failures and panics.
    fn run_callback(&self, name: &'static str, callback: impl FnOnce() -> HandlerResult) {
        match catch_unwind(AssertUnwindSafe(callback)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(client_id = %self.inner.id, callback = name, error = %e, "Callback failed"),
            Err(_) => warn!(client_id = %self.inner.id, callback = name, "Callback panicked"),
        }
    }
}

/// Display form used by [`EchoClient::print`].
fn render_printable(value: &Value) -> Result<String> {
    Ok(match value {
        Value::String(text) => text.clone(),
        Value::Object(_) | Value::Array(_) => serde_json::to_string_pretty(value)?,
        other => other.to_string(),
    })
}

// ============================================================================
// EchoClient - Handlers
// ============================================================================

impl EchoClient {
    /// Registers a handler for echo-channel messages no waiter claims.
    ///
    /// Handlers run in registration order. One failing handler does not stop
    /// the others. Removed by [`disconnect`](Self::disconnect).
    ///
    /// To call back into the client, capture [`downgrade`](Self::downgrade)
    /// rather than a clone.
    pub fn on_message<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&str) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner.echo.registry().add_handler(handler)
    }

    /// Registers a handler for push-channel messages.
    pub fn on_push_message<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&str) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner.push.registry().add_handler(handler)
    }

    /// Unregisters an echo handler. Returns `false` if it was not registered.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.inner.echo.registry().remove_handler(id)
    }

    /// Unregisters a push handler. Returns `false` if it was not registered.
    pub fn remove_push_handler(&self, id: HandlerId) -> bool {
        self.inner.push.registry().remove_handler(id)
    }
}

// ============================================================================
// Tests
// ============================================================================
