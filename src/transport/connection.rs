//! WebSocket connection and event loop.
//!
//! A [`Connection`] wraps one live client socket. Opening it spawns a tokio
//! task that handles:
//!
//! - Incoming frames, routed through the channel's [`HandlerRegistry`]
//! - Outgoing text queued by the public API
//! - Close on request, on drop of the last handle, or by the remote end
//!
//! The event loop never touches channel state directly. When the remote end
//! goes away it reports through the [`LostCallback`] given at spawn time.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::Channel;

use super::registry::{Dispatch, HandlerRegistry};

// ============================================================================
// Constants
// ============================================================================

/// How long to wait for the peer's close acknowledgement.
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// Types
// ============================================================================

/// Client socket as produced by the handshake.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the socket.
type WsSink = SplitSink<WsStream, Message>;

/// Read half of the socket.
type WsSource = SplitStream<WsStream>;

/// Called once, from the event loop, when the remote end closes or fails.
pub type LostCallback = Box<dyn FnOnce(ConnectionId) + Send + 'static>;

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write one text frame.
    Send(String),
    /// Close the socket and stop.
    Shutdown,
}

/// Why the event loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// Shutdown requested locally, or every handle dropped.
    Local,
    /// Remote close, stream end, or transport error.
    Remote,
}

// ============================================================================
// Connection
// ============================================================================

/// One live WebSocket connection.
///
/// Owned by its channel and replaced, never reused, on reconnect.
pub struct Connection {
    /// Identifies this connection in the registry and in logs.
    id: ConnectionId,
    /// Channel this connection serves.
    channel: Channel,
    /// Address the connection was opened to.
    url: Url,
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Event loop task, taken by [`Connection::closed`].
    task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Performs the WebSocket handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectFailed`] if the handshake fails or does not
    /// finish within `connect_timeout`.
    pub async fn handshake(url: &Url, connect_timeout: Duration) -> Result<WsStream> {
        debug!(url = %url, "Opening WebSocket");

        match timeout(connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok((stream, response))) => {
                trace!(url = %url, status = %response.status(), "Handshake complete");
                Ok(stream)
            }
            Ok(Err(e)) => Err(Error::connect_failed(url.as_str(), e.to_string())),
            Err(_) => Err(Error::connect_failed(
                url.as_str(),
                format!(
                    "handshake timed out after {}ms",
                    connect_timeout.as_millis()
                ),
            )),
        }
    }

    /// Wraps a handshaken socket and spawns its event loop.
    pub fn spawn(
        id: ConnectionId,
        channel: Channel,
        url: Url,
        stream: WsStream,
        registry: Arc<HandlerRegistry>,
        on_lost: LostCallback,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(Self::run_event_loop(
            id, channel, stream, command_rx, registry, on_lost,
        ));

        info!(%channel, connection_id = %id, url = %url, "WebSocket connection established");

        Self {
            id,
            channel,
            url,
            command_tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Returns the connection ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues one text frame for sending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the event loop has stopped.
    pub fn send_text(&self, text: String) -> Result<()> {
        self.command_tx
            .send(ConnectionCommand::Send(text))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Asks the event loop to close the socket.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Waits for the event loop to finish, at most `within`.
    ///
    /// Returns `false` if the loop was still running when the wait gave up.
    pub async fn closed(&self, within: Duration) -> bool {
        let Some(task) = self.task.lock().take() else {
            return true;
        };

        match timeout(within, task).await {
            Ok(_) => true,
            Err(_) => {
                warn!(
                    channel = %self.channel,
                    connection_id = %self.id,
                    "Event loop did not stop within {}ms",
                    within.as_millis()
                );
                false
            }
        }
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        id: ConnectionId,
        channel: Channel,
        stream: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        registry: Arc<HandlerRegistry>,
        on_lost: LostCallback,
    ) {
        let (mut ws_write, mut ws_read) = stream.split();

        let exit = loop {
            tokio::select! {
                // Incoming frames from the server
                message = ws_read.next() => {
                    match Self::handle_incoming(id, channel, message, &registry) {
                        Some(exit) => break exit,
                        None => continue,
                    }
                }

                // Commands from the public API
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send(text)) => {
                            if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                                warn!(%channel, connection_id = %id, error = %e, "Failed to send message");
                                break LoopExit::Remote;
                            }
                            trace!(%channel, connection_id = %id, "Message sent");
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!(%channel, connection_id = %id, "Shutdown command received");
                            Self::close_socket(&mut ws_write, &mut ws_read).await;
                            break LoopExit::Local;
                        }

                        None => {
                            debug!(%channel, connection_id = %id, "Command channel closed");
                            Self::close_socket(&mut ws_write, &mut ws_read).await;
                            break LoopExit::Local;
                        }
                    }
                }
            }
        };

        if exit == LoopExit::Remote {
            on_lost(id);
        }

        debug!(%channel, connection_id = %id, ?exit, "Event loop terminated");
    }

    /// Handles one item from the read half.
    ///
    /// Returns `Some` when the loop must stop.
    fn handle_incoming(
        id: ConnectionId,
        channel: Channel,
        message: Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>,
        registry: &HandlerRegistry,
    ) -> Option<LoopExit> {
        match message {
            Some(Ok(Message::Text(text))) => {
                Self::route(id, channel, text.as_str(), registry);
                None
            }

            Some(Ok(Message::Binary(data))) => {
                let text = String::from_utf8_lossy(&data);
                Self::route(id, channel, &text, registry);
                None
            }

            Some(Ok(Message::Close(frame))) => {
                debug!(%channel, connection_id = %id, ?frame, "WebSocket closed by remote");
                Some(LoopExit::Remote)
            }

            Some(Err(e)) => {
                error!(%channel, connection_id = %id, error = %e, "WebSocket error");
                Some(LoopExit::Remote)
            }

            None => {
                debug!(%channel, connection_id = %id, "WebSocket stream ended");
                Some(LoopExit::Remote)
            }

            // Ping/Pong are answered by tungstenite
            _ => None,
        }
    }

    /// Dispatches one payload and logs the outcome.
    fn route(id: ConnectionId, channel: Channel, payload: &str, registry: &HandlerRegistry) {
        trace!(%channel, connection_id = %id, payload, "Message received");

        match registry.dispatch(id, payload) {
            Dispatch::Claimed(waiter_id) => {
                trace!(%channel, %waiter_id, "Reply delivered");
            }
            Dispatch::Broadcast { invoked: 0, .. } => {
                trace!(%channel, "Unclaimed message with no handlers");
            }
            Dispatch::Broadcast { invoked, failed } => {
                trace!(%channel, invoked, failed, "Message broadcast to handlers");
            }
            Dispatch::Stale => {}
        }
    }

    /// Sends a close frame and drains until the peer acknowledges.
    async fn close_socket(ws_write: &mut WsSink, ws_read: &mut WsSource) {
        if let Err(e) = ws_write.close().await {
            trace!(error = %e, "Close frame not sent");
            return;
        }

        let drain = async {
            while let Some(Ok(message)) = ws_read.next().await {
                if message.is_close() {
                    break;
                }
            }
        };

        let _ = timeout(CLOSE_DRAIN_TIMEOUT, drain).await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{Ipv4Addr, SocketAddr};

    use tokio::net::TcpListener;

    #[test]
    fn test_close_drain_timeout() {
        assert_eq!(CLOSE_DRAIN_TIMEOUT.as_secs(), 1);
    }

    #[tokio::test]
    async fn test_handshake_refused() {
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
            .await
            .expect("bind should succeed");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);

        let url = Url::parse(&format!("ws://127.0.0.1:{port}")).expect("valid url");
        let err = Connection::handshake(&url, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectFailed { .. }));
    }

    #[tokio::test]
    async fn test_handshake_times_out_on_silent_peer() {
        // Accepts TCP but never answers the upgrade request.
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
            .await
            .expect("bind should succeed");
        let port = listener.local_addr().expect("local addr").port();
        let _accept = tokio::spawn(async move {
            let held = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(held);
        });

        let url = Url::parse(&format!("ws://127.0.0.1:{port}")).expect("valid url");
        let err = Connection::handshake(&url, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
