//! Connection lifecycle against a live in-process server.

mod common;

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::Result;
use echo_socket::{ConnectionState, EchoClient, Error};
use tokio::net::TcpListener;

use tokio::sync::mpsc;

use common::{
    GREETING, Mode, TEST_WAIT, TestServer, init_logging, recv, wait_for_pending, wait_until,
};

// ============================================================================
// Connect
// ============================================================================

#[tokio::test]
async fn test_connect_opens_echo_channel() -> Result<()> {
    init_logging();
    let server = TestServer::start(Mode::Echo).await;
    let client = server.client();

    let ack = client.connect(&server.url()).await?;

    assert_eq!(ack.channel, echo_socket::Channel::Echo);
    let status = client.status();
    assert!(status.echo_connected);
    assert!(!status.push_connected);
    assert_eq!(status.echo_state, ConnectionState::Open);
    server.wait_for_live(1).await;
    Ok(())
}

#[tokio::test]
async fn test_connect_failure_leaves_channel_closed() -> Result<()> {
    // Bind then drop so the port is very likely unused.
    let port = {
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).await?;
        listener.local_addr()?.port()
    };
    let client = EchoClient::builder()
        .default_url(format!("ws://127.0.0.1:{port}"))
        .build()?;

    let err = client.connect_default().await.unwrap_err();

    assert!(matches!(err, Error::ConnectFailed { .. }));
    assert_eq!(client.status().echo_state, ConnectionState::Closed);
    assert!(client.send_message("hi").is_err());
    Ok(())
}

#[tokio::test]
async fn test_back_to_back_connects_leave_one_connection() -> Result<()> {
    init_logging();
    let server = TestServer::start(Mode::Echo).await;
    let client = server.client();

    let (first, second) = tokio::join!(client.connect_default(), client.connect_default());

    assert!(matches!(first, Err(Error::ConnectSuperseded { .. })));
    second?;
    assert!(client.status().echo_connected);

    server.wait_for_live(1).await;
    assert_eq!(server.accepted_connections(), 2);

    let reply = client.send_message_and_wait("still here", TEST_WAIT).await?;
    assert_eq!(reply, "still here");
    Ok(())
}

#[tokio::test]
async fn test_superseded_handshake_keeps_handlers() -> Result<()> {
    let server = TestServer::start(Mode::Silent).await;
    let client = server.client();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handler = client.on_message(move |text| {
        tx.send(text.to_string())?;
        Ok(())
    });

    let (first, second) = tokio::join!(client.connect_default(), client.connect_default());
    assert!(matches!(first, Err(Error::ConnectSuperseded { .. })));
    second?;
    server.wait_for_live(1).await;

    server.push("after retry");
    assert_eq!(recv(&mut rx).await, "after retry");
    assert!(client.remove_handler(handler));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_first_frame_after_handshake_is_delivered() -> Result<()> {
    let server = TestServer::start(Mode::Greet).await;

    for _ in 0..20 {
        let client = server.client();
        let (tx, mut rx) = mpsc::unbounded_channel();
        client.on_message(move |text| {
            tx.send(text.to_string())?;
            Ok(())
        });

        client.connect_default().await?;
        assert_eq!(recv(&mut rx).await, GREETING);
        client.disconnect();
    }
    Ok(())
}

#[tokio::test]
async fn test_reconnect_replaces_connection_and_clears_handlers() -> Result<()> {
    let server = TestServer::start(Mode::Echo).await;
    let client = server.client();

    let first = client.connect_default().await?;
    let handler = client.on_message(|_| Ok(()));
    let second = client.connect_default().await?;

    assert_ne!(first.connection_id, second.connection_id);
    assert!(!client.remove_handler(handler));
    server.wait_for_live(1).await;

    let reply = client.send_message_and_wait("again", TEST_WAIT).await?;
    assert_eq!(reply, "again");
    Ok(())
}

#[tokio::test]
async fn test_disconnect_during_handshake_supersedes_connect() -> Result<()> {
    // Accepts TCP, never answers the upgrade, hangs up after 300ms.
    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                drop(stream);
            });
        }
    });

    let client = EchoClient::builder()
        .default_url(format!("ws://{addr}"))
        .connect_timeout(TEST_WAIT)
        .build()?;

    let connecting = {
        let client = client.clone();
        tokio::spawn(async move { client.connect_default().await })
    };
    assert!(wait_until(|| client.status().echo_state == ConnectionState::Connecting).await);

    client.disconnect();
    assert_eq!(client.status().echo_state, ConnectionState::Closed);

    let err = connecting.await?.unwrap_err();
    assert!(matches!(err, Error::ConnectSuperseded { .. }));
    assert_eq!(client.status().echo_state, ConnectionState::Closed);
    Ok(())
}

// ============================================================================
// Disconnect
// ============================================================================

#[tokio::test]
async fn test_disconnect_rejects_pending_waiters() -> Result<()> {
    init_logging();
    let server = TestServer::start(Mode::Silent).await;
    let client = server.client();
    client.connect_default().await?;

    let mut calls = Vec::new();
    for i in 0..2 {
        let task_client = client.clone();
        calls.push(tokio::spawn(async move {
            task_client.send_message_and_wait(format!("m{i}"), TEST_WAIT).await
        }));
        wait_for_pending(&client, i + 1).await;
    }

    client.disconnect();

    let status = client.status();
    assert!(!status.echo_connected);
    assert_eq!(status.echo_state, ConnectionState::Closed);
    assert_eq!(client.pending_count(), 0);

    for call in calls {
        let err = call.await?.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }
    server.wait_for_live(0).await;
    Ok(())
}

#[tokio::test]
async fn test_disconnect_is_idempotent() -> Result<()> {
    let server = TestServer::start(Mode::Echo).await;
    let client = server.client();

    client.disconnect();
    assert_eq!(client.status().echo_state, ConnectionState::Idle);

    client.connect_default().await?;
    client.disconnect();
    client.disconnect();

    assert_eq!(client.status().echo_state, ConnectionState::Closed);
    assert!(matches!(
        client.send_message("after").unwrap_err(),
        Error::NotConnected { .. }
    ));
    Ok(())
}

#[tokio::test]
async fn test_remote_close_rejects_waiters_keeps_handlers() -> Result<()> {
    let server = TestServer::start(Mode::Silent).await;
    let client = server.client();
    let handler = client.on_message(|_| Ok(()));
    client.connect_default().await?;

    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.send_message_and_wait("pending", TEST_WAIT).await })
    };
    wait_for_pending(&client, 1).await;

    server.close_all();

    let err = call.await?.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
    assert!(wait_until(|| client.status().echo_state == ConnectionState::Closed).await);
    assert!(matches!(
        client.send_message("gone").unwrap_err(),
        Error::NotConnected { .. }
    ));

    assert!(client.remove_handler(handler));
    Ok(())
}

#[tokio::test]
async fn test_dropping_last_handle_closes_connections() -> Result<()> {
    let server = TestServer::start(Mode::Echo).await;
    let client = server.client();
    client.connect_default().await?;
    client.connect_push().await?;
    server.wait_for_live(2).await;

    drop(client);

    server.wait_for_live(0).await;
    Ok(())
}

// ============================================================================
// Push channel
// ============================================================================

#[tokio::test]
async fn test_push_channel_is_independent() -> Result<()> {
    let server = TestServer::start(Mode::Echo).await;
    let client = server.client();

    let ack = client.connect_push().await?;
    assert_eq!(ack.channel, echo_socket::Channel::Push);
    assert!(ack.url.ends_with("/.sse"));

    client.connect_default().await?;
    let status = client.status();
    assert!(status.echo_connected);
    assert!(status.push_connected);

    client.disconnect_push();
    let status = client.status();
    assert!(status.echo_connected);
    assert!(!status.push_connected);

    client.disconnect_all();
    let json = serde_json::to_value(client.status())?;
    assert_eq!(json["echoState"], "closed");
    assert_eq!(json["pushState"], "closed");
    Ok(())
}
