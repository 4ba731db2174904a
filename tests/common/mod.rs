//! Shared utilities for integration tests.
//!
//! Provides an in-process WebSocket server:
//! - `Mode::Echo` returns every text frame unchanged
//! - `Mode::Silent` records frames and answers nothing
//! - `Mode::Greet` sends [`GREETING`] right after the handshake, then echoes
//!
//! Either mode can push arbitrary text or close every connection on demand.

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use echo_socket::{ClientBuilder, EchoClient};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::time::{Instant, sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for any single wait in a test.
pub const TEST_WAIT: Duration = Duration::from_secs(5);

/// First frame sent by a `Mode::Greet` server.
pub const GREETING: &str = "welcome";

// ============================================================================
// Types
// ============================================================================

/// How the server answers text frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Echo,
    Silent,
    Greet,
}

/// Control messages fanned out to every live connection.
#[derive(Debug, Clone)]
enum Control {
    Push(String),
    Close,
}

/// In-process WebSocket server.
pub struct TestServer {
    addr: SocketAddr,
    control_tx: broadcast::Sender<Control>,
    received_rx: Mutex<mpsc::UnboundedReceiver<String>>,
    live: Arc<AtomicUsize>,
    accepted: Arc<AtomicUsize>,
}

// ============================================================================
// TestServer
// ============================================================================

impl TestServer {
    /// Binds to a random localhost port and starts accepting.
    pub async fn start(mode: Mode) -> Self {
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("local addr");

        let (control_tx, _) = broadcast::channel(64);
        let (received_tx, received_rx) = mpsc::unbounded_channel();
        let live = Arc::new(AtomicUsize::new(0));
        let accepted = Arc::new(AtomicUsize::new(0));

        let server_control = control_tx.clone();
        let server_live = Arc::clone(&live);
        let server_accepted = Arc::clone(&accepted);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                // Subscribe before the handshake so no push is missed.
                let control_rx = server_control.subscribe();
                let received_tx = received_tx.clone();
                let live = Arc::clone(&server_live);
                server_accepted.fetch_add(1, Ordering::SeqCst);

                tokio::spawn(serve(stream, mode, control_rx, received_tx, live));
            }
        });

        Self {
            addr,
            control_tx,
            received_rx: Mutex::new(received_rx),
            live,
            accepted,
        }
    }

    /// `ws://127.0.0.1:<port>`
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Client whose default (and derived push) address is this server.
    pub fn client(&self) -> EchoClient {
        self.builder().build().expect("valid options")
    }

    /// Builder preconfigured for this server.
    pub fn builder(&self) -> ClientBuilder {
        EchoClient::builder().default_url(self.url())
    }

    /// Sends `text` to every live connection.
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.control_tx.send(Control::Push(text.into()));
    }

    /// Closes every live connection from the server side.
    pub fn close_all(&self) {
        let _ = self.control_tx.send(Control::Close);
    }

    /// Next text frame received from any client.
    pub async fn next_received(&self) -> String {
        let mut rx = self.received_rx.lock().await;
        timeout(TEST_WAIT, rx.recv())
            .await
            .expect("server received nothing in time")
            .expect("server stopped")
    }

    /// Connections currently open.
    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Connections accepted since start.
    pub fn accepted_connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Waits until exactly `n` connections are open.
    pub async fn wait_for_live(&self, n: usize) {
        let wait = wait_until(|| self.live_connections() == n).await;
        assert!(
            wait,
            "expected {n} live connections, have {}",
            self.live_connections()
        );
    }
}

/// Serves one connection until either side closes.
async fn serve(
    stream: TcpStream,
    mode: Mode,
    mut control_rx: broadcast::Receiver<Control>,
    received_tx: mpsc::UnboundedSender<String>,
    live: Arc<AtomicUsize>,
) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    live.fetch_add(1, Ordering::SeqCst);

    let (mut write, mut read) = ws.split();

    if mode == Mode::Greet && write.send(Message::Text(GREETING.into())).await.is_err() {
        live.fetch_sub(1, Ordering::SeqCst);
        return;
    }

    loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let _ = received_tx.send(text.to_string());
                    if mode != Mode::Silent && write.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    // Flushes tungstenite's queued close reply.
                    let _ = write.close().await;
                    break;
                }
                Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },

            control = control_rx.recv() => match control {
                Ok(Control::Push(text)) => {
                    if write.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(Control::Close) => {
                    let _ = write.close().await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    live.fetch_sub(1, Ordering::SeqCst);
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing for tests. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("echo_socket=debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Polls `condition` every 5ms until it holds or [`TEST_WAIT`] passes.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TEST_WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Receives from a handler's channel with [`TEST_WAIT`] as bound.
pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(TEST_WAIT, rx.recv())
        .await
        .expect("nothing received in time")
        .expect("sender dropped")
}

/// Waits until the client has `n` pending waiters.
pub async fn wait_for_pending(client: &EchoClient, n: usize) {
    let reached = wait_until(|| client.pending_count() == n).await;
    assert!(reached, "expected {n} pending, have {}", client.pending_count());
}
