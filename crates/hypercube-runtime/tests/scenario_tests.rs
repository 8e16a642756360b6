//! End-to-end scenarios against stub TCP servers
//!
//! Each test binds a listener on an ephemeral port, points a real
//! `HyperCubeClient` at it and plays the server side by hand.

mod common;

use std::time::Duration;

use common::*;
use hypercube_runtime::{
    ClientConfig, HyperCubeClient, Msg, SequentialIdGenerator, SessionState, Subsystem,
};
use serde_json::json;
use tokio::sync::oneshot;
use tokio::time::{timeout, Instant};
use tracing::Level;

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

fn test_client(port: u16) -> HyperCubeClient {
    let config = ClientConfig::testing()
        .with_server_port(port)
        .with_connection_name("scenario")
        .with_group_name("scenario-group");
    let socket = std::sync::Arc::new(hypercube_runtime::TcpClient::new(config.connect_timeout));
    HyperCubeClient::new(config, socket, &SequentialIdGenerator::new(1000)).unwrap()
}

async fn wait_for_handshake(client: &HyperCubeClient) {
    assert!(
        eventually(Duration::from_secs(5), || matches!(
            client.status().state,
            SessionState::Handshaking | SessionState::Open
        ))
        .await,
        "client never connected: {:?}",
        client.status()
    );
}

// ----------------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_server_closes_immediately_then_reconnect_after_delay() {
    let (listener, port) = stub_listener().await;
    let client = test_client(port);
    let delay = client.config().reconnect_delay;

    client.init("127.0.0.1").unwrap();

    let (first, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    let first_at = Instant::now();
    drop(first);

    let (second, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    let gap = first_at.elapsed();
    assert!(gap >= delay, "reconnected after {:?}, before the {:?} grace period", gap, delay);

    assert!(eventually(Duration::from_secs(2), || client.status().successful_connections >= 2).await);
    assert!(client.status().connection_attempts >= 2);
    assert_eq!(client.stats().recv.frames_received, 0);

    drop(second);
    client.deinit().await.unwrap();
    assert_eq!(client.status().state, SessionState::Disconnected);
}

#[tokio::test]
async fn test_frame_split_across_writes_is_delivered_once() {
    let (listener, port) = stub_listener().await;
    let client = test_client(port);
    let (done_tx, done_rx) = oneshot::channel::<()>();

    let payload = r#"{"command":"hello","n":12345}"#;
    let frame = encode_frame(Subsystem::Command, payload);
    assert_eq!(frame.len(), 37);

    let server = tokio::spawn(async move {
        use tokio::io::AsyncWriteExt;
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.set_nodelay(true).unwrap();
        read_until_command(&mut stream, "localPing").await.unwrap();

        let mut offset = 0;
        for piece in [3usize, 1, 33] {
            stream.write_all(&frame[offset..offset + piece]).await.unwrap();
            stream.flush().await.unwrap();
            offset += piece;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let _ = done_rx.await;
    });

    client.init("127.0.0.1").unwrap();
    assert!(client.wait_for_data(Duration::from_secs(5)).await);

    let packet = client.get_packet().unwrap();
    assert_eq!(packet.len(), 37);
    assert_eq!(packet.payload(), payload.as_bytes());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(client.get_packet().is_none());
    assert_eq!(client.stats().recv.frames_received, 1);

    let _ = done_tx.send(());
    client.deinit().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_burst_of_sends_arrives_in_order() {
    const COUNT: usize = 500;

    let (listener, port) = stub_listener().await;
    let client = test_client(port);

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut sequence = Vec::with_capacity(COUNT);
        let mut bytes = 0usize;
        while sequence.len() < COUNT {
            let (header, payload) = read_frame(&mut stream).await.expect("stream ended early");
            if header.subsystem != Subsystem::Command.as_u16() {
                continue;
            }
            bytes += hypercube_core::HEADER_LEN + payload.len();
            let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
            sequence.push(json["seq"].as_u64().unwrap() as usize);
        }
        (sequence, bytes)
    });

    client.init("127.0.0.1").unwrap();
    wait_for_handshake(&client).await;

    let mut expected_bytes = 0usize;
    for seq in 0..COUNT {
        let msg = Msg::command(json!({ "seq": seq }).to_string());
        expected_bytes += hypercube_core::HEADER_LEN + msg.payload.len();
        client.send_msg(&msg).unwrap();
    }

    let (sequence, bytes) = timeout(Duration::from_secs(10), server)
        .await
        .expect("server did not receive every frame")
        .unwrap();
    assert_eq!(sequence, (0..COUNT).collect::<Vec<_>>());
    assert_eq!(bytes, expected_bytes);

    assert!(eventually(Duration::from_secs(2), || client.stats().send.frames_sent >= COUNT as u64).await);
    client.deinit().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_senders_keep_per_sender_order() {
    const SENDERS: usize = 4;
    const PER_SENDER: usize = 50;

    let (listener, port) = stub_listener().await;
    let client = test_client(port);

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut seen: Vec<Vec<u64>> = vec![Vec::new(); SENDERS];
        let mut total = 0;
        while total < SENDERS * PER_SENDER {
            let (header, payload) = read_frame(&mut stream).await.expect("stream ended early");
            if header.subsystem != Subsystem::Command.as_u16() {
                continue;
            }
            let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
            let sender = json["sender"].as_u64().unwrap() as usize;
            seen[sender].push(json["seq"].as_u64().unwrap());
            total += 1;
        }
        seen
    });

    client.init("127.0.0.1").unwrap();
    wait_for_handshake(&client).await;

    let senders = (0..SENDERS).map(|sender| {
        let client = &client;
        async move {
            for seq in 0..PER_SENDER {
                client
                    .send_msg(&Msg::command(json!({ "sender": sender, "seq": seq }).to_string()))
                    .unwrap();
                tokio::task::yield_now().await;
            }
        }
    });
    futures::future::join_all(senders).await;

    let seen = timeout(Duration::from_secs(10), server)
        .await
        .expect("server did not receive every frame")
        .unwrap();
    for sequence in seen {
        assert_eq!(sequence, (0..PER_SENDER as u64).collect::<Vec<_>>());
    }
    client.deinit().await.unwrap();
}

#[tokio::test]
async fn test_create_group_rejection_logs_warning() {
    let (logs, _guard) = capture_logs();
    let (listener, port) = stub_listener().await;
    let client = test_client(port);
    let (done_tx, done_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let create = read_until_command(&mut stream, "createGroup").await.unwrap();
        assert_eq!(create["groupName"], "scenario-group");
        assert_eq!(create["systemId"], 1000);
        write_signalling(&mut stream, json!({"command": "createGroupAck", "status": false})).await;
        let _ = done_rx.await;
    });

    client.init("127.0.0.1").unwrap();
    assert!(eventually(Duration::from_secs(5), || client.status().handshake_failures >= 1).await);

    assert!(logs.contains(Level::WARN, "possible duplicate name"));
    assert!(client.status().is_connected());
    assert!(client.recv_msg().is_none());

    let _ = done_tx.send(());
    client.deinit().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_handshake_order_and_session_open() {
    let (listener, port) = stub_listener().await;
    let client = test_client(port);
    let (done_tx, done_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut commands = Vec::new();
        while commands.len() < 3 {
            let (header, payload) = read_frame(&mut stream).await.unwrap();
            assert_eq!(header.subsystem, Subsystem::Signalling.as_u16());
            let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
            commands.push(json["command"].as_str().unwrap().to_string());
            if json["command"] == "connectionInfo" {
                assert_eq!(json["connectionInfo"]["connectionName"], "scenario");
                assert_eq!(json["connectionInfo"]["instanceId"], 1001);
            }
        }
        write_signalling(&mut stream, json!({"command": "connectionInfo", "status": true})).await;
        let _ = done_rx.await;
        commands
    });

    client.init("127.0.0.1").unwrap();
    assert!(eventually(Duration::from_secs(5), || client.status().state == SessionState::Open).await);

    let _ = done_tx.send(());
    let commands = server.await.unwrap();
    assert_eq!(commands, vec!["connectionInfo", "createGroup", "localPing"]);
    client.deinit().await.unwrap();
}

#[tokio::test]
async fn test_connect_failures_warn_once_per_streak() {
    let (logs, _guard) = capture_logs();
    let (listener, port) = stub_listener().await;
    drop(listener);

    let config = ClientConfig::testing()
        .with_server_port(port)
        .with_reconnect_interval(Duration::from_millis(20));
    let client = HyperCubeClient::with_tcp(config).unwrap();
    client.init("127.0.0.1").unwrap();

    assert!(eventually(Duration::from_secs(5), || client.status().failed_connections >= 3).await);
    client.deinit().await.unwrap();

    let warnings = logs
        .events()
        .into_iter()
        .filter(|event| event.level == Level::WARN && event.message.contains("Failed to connect"))
        .count();
    assert_eq!(warnings, 1);
    assert!(client.status().warned);
}
