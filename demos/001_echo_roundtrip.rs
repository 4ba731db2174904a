//! Echo round trip and latency probe.
//!
//! Demonstrates:
//! - Building a client with a custom default address
//! - Awaiting correlated replies, sequentially and concurrently
//! - Measuring round-trip latency
//! - Printing channel status through the print hook
//!
//! Usage:
//!   cargo run --example 001_echo_roundtrip -- ws://127.0.0.1:9001
//!   cargo run --example 001_echo_roundtrip --features native-tls
//!   cargo run --example 001_echo_roundtrip -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use common::Args;
use echo_socket::{EchoClient, Result};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== 001: Echo Round Trip ===\n");

    let mut builder = EchoClient::builder().reply_timeout(Duration::from_secs(3));
    if let Some(url) = args.url {
        builder = builder.default_url(url);
    }
    let client = builder.build()?;

    client.on_message(|text| {
        println!("        [unsolicited] {text}");
        Ok(())
    });

    let ack = client.connect_default().await?;
    println!("[Connect] {} ({})", ack.url, ack.connection_id);

    // Public echo servers greet on connect; let it reach the handler.
    client.sleep(Duration::from_millis(500)).await;

    // ========================================================================
    // Sequential
    // ========================================================================

    let reply = client.send_message_and_wait_default("hello").await?;
    println!("[Reply]   {reply}");

    // ========================================================================
    // Concurrent
    // ========================================================================

    let (a, b) = tokio::join!(
        client.send_message_and_wait_default("first"),
        client.send_message_and_wait_default("second"),
    );
    println!("[Replies] {} / {}", a?, b?);

    // ========================================================================
    // Latency
    // ========================================================================

    for _ in 0..3 {
        let latency = client.measure_latency().await?;
        println!("[Latency] {latency}ms");
        client.sleep(Duration::from_millis(200)).await;
    }

    client.on_print(|text| {
        println!("[Status]\n{text}");
        Ok(())
    });
    client.print(&client.status())?;

    client.disconnect_all();
    println!("\n=== Done ===");
    Ok(())
}
