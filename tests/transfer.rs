//! End-to-end transfer tests: a real client session against a real server
//! over the loopback interface, with and without injected faults.

use std::sync::Arc;
use std::time::Duration;

use gbn_over_udp::client::{Client, ClientConfig};
use gbn_over_udp::server::{Server, ServerConfig};
use gbn_over_udp::socket::Socket;

/// Bind a server to an OS-assigned loopback port and run its dispatcher in
/// the background.
async fn start_server(config: ServerConfig) -> Arc<Server> {
    let server = Arc::new(
        Server::bind("127.0.0.1:0".parse().unwrap(), config)
            .await
            .expect("server bind"),
    );
    let runner = Arc::clone(&server);
    tokio::spawn(async move {
        let _ = runner.run().await;
    });
    server
}

/// Client configuration with a short linger so tests finish promptly.
fn quick_client(total_packets: u32) -> ClientConfig {
    ClientConfig {
        total_packets,
        linger: Duration::from_millis(200),
        ..ClientConfig::default()
    }
}

/// Poll until the server has no live session handlers.
async fn wait_for_empty_sessions(server: &Server) -> bool {
    for _ in 0..100 {
        if server.session_count().await == 0 {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

// ---------------------------------------------------------------------------
// Test 1: clean link — 30 packets, everything acknowledged exactly once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clean_link_delivers_all_packets() {
    let server = start_server(ServerConfig::default()).await;

    let socket = Socket::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("client bind");
    let client = Client::connect(socket, server.local_addr(), quick_client(30))
        .await
        .expect("handshake");
    let report = client.run().await.expect("session run");

    assert_eq!(report.acked_count(), 30);
    assert!(
        report.rows().iter().all(|r| r.is_some()),
        "every packet must have an RTT sample on a clean link"
    );
    let summary = report.summary().expect("summary");
    assert_eq!(summary.acked, 30);
    assert!(summary.min_ms >= 0.0);
    assert!(summary.max_ms >= summary.min_ms);

    assert!(
        wait_for_empty_sessions(&server).await,
        "session handler must remove itself after teardown"
    );
}

// ---------------------------------------------------------------------------
// Test 2: lossy link — transfer completes via retransmission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lossy_link_delivers_all_packets() {
    let server = start_server(ServerConfig {
        loss_rate: 0.35,
        seed: Some(7),
        ..ServerConfig::default()
    })
    .await;

    let socket = Socket::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("client bind");
    let client = Client::connect(socket, server.local_addr(), quick_client(20))
        .await
        .expect("handshake");
    let report = client.run().await.expect("session run");

    assert_eq!(
        report.acked_count(),
        20,
        "all packets must eventually be acknowledged despite loss"
    );
    assert!(wait_for_empty_sessions(&server).await);
}

// ---------------------------------------------------------------------------
// Test 3: a window too small for any payload is rejected, not spun on
// ---------------------------------------------------------------------------

#[tokio::test]
async fn undersized_window_is_rejected_up_front() {
    let server = start_server(ServerConfig::default()).await;

    let socket = Socket::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("client bind");
    let config = ClientConfig {
        window_bytes: 10, // smaller than the minimum payload size
        ..quick_client(5)
    };
    let err = Client::connect(socket, server.local_addr(), config)
        .await
        .expect_err("a window that fits no packet must be refused");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
}

// ---------------------------------------------------------------------------
// Test 4: two clients share one server without interfering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_clients_are_isolated() {
    let server = start_server(ServerConfig::default()).await;
    let addr = server.local_addr();

    let mut tasks = Vec::new();
    for _ in 0..2 {
        tasks.push(tokio::spawn(async move {
            let socket = Socket::bind("127.0.0.1:0".parse().unwrap())
                .await
                .expect("client bind");
            let client = Client::connect(socket, addr, quick_client(10))
                .await
                .expect("handshake");
            client.run().await.expect("session run")
        }));
    }

    for task in tasks {
        let report = task.await.expect("client task");
        assert_eq!(report.acked_count(), 10);
    }
    assert!(wait_for_empty_sessions(&server).await);
}
