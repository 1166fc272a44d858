//! End-to-end replication between two servers on loopback
//!
//! Both servers share the request base port (peers compute each other's
//! endpoints from it) and stream to loopback instead of a multicast group
//! so the test needs no multicast-capable interface.

use std::net::Ipv4Addr;
use std::time::Duration;

use dsm_rs::{Client, Server, ServerConfig};

const REQUEST_BASE: u16 = 43000;
const MULTICAST_BASE: u16 = 43100;
const LOCALHOST: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);

fn config(dir: &std::path::Path, server_id: u8) -> ServerConfig {
    ServerConfig::new(server_id)
        .runtime_dir(dir)
        .request_base_port(REQUEST_BASE)
        .multicast_base_port(MULTICAST_BASE)
        .multicast_group(LOCALHOST)
        .segment_size(8192)
        .sender_interval(Duration::from_millis(10))
        .inactivity_timeout(Duration::from_millis(200))
}

async fn poll<F, Fut>(mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if probe().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn replicates_buffer_between_servers() {
    let dir = tempfile::tempdir().unwrap();

    let server_a = Server::new(config(dir.path(), 0)).await.unwrap();
    let server_b = Server::new(config(dir.path(), 1)).await.unwrap();
    let client_a = Client::connect(&server_a, 0).await.unwrap();
    let client_b = Client::connect(&server_b, 0).await.unwrap();
    let handle_a = server_a.handle();
    let handle_b = server_b.handle();
    let task_a = tokio::spawn(server_a.run());
    let task_b = tokio::spawn(server_b.run());

    // A owns the buffer; B subscribes to it by name and address
    client_a.register_buffer("telemetry", 16).await.unwrap();
    assert!(poll(|| async { client_a.local_size("telemetry").await.is_some() }).await);
    client_a.write("telemetry", b"position 1 2 3").await.unwrap();

    client_b
        .fetch_buffer("telemetry", LOCALHOST, 0)
        .await
        .unwrap();

    // the ACK materializes the replica with the owner's registered size
    assert!(
        poll(|| async { client_b.remote_size("telemetry", LOCALHOST, 0).await == Some(16) }).await,
        "replica never materialized"
    );

    // the multicast stream fills it and marks it active
    assert!(
        poll(|| async {
            let contents = client_b.read_remote("telemetry", LOCALHOST, 0).await;
            matches!(contents, Ok(c) if &c[..14] == b"position 1 2 3")
        })
        .await,
        "replica never received the owner's contents"
    );
    assert!(client_b.is_remote_active("telemetry", LOCALHOST, 0).await);

    // updates keep flowing
    client_a.write("telemetry", b"position 4 5 6").await.unwrap();
    assert!(
        poll(|| async {
            let contents = client_b.read_remote("telemetry", LOCALHOST, 0).await;
            matches!(contents, Ok(c) if &c[..14] == b"position 4 5 6")
        })
        .await,
        "replica never saw the update"
    );

    // the owner going away silences the stream; the replica stays readable
    // but flips inactive once the window elapses
    handle_a.stop().await;
    task_a.await.unwrap().unwrap();
    assert!(
        poll(|| async { !client_b.is_remote_active("telemetry", LOCALHOST, 0).await }).await,
        "replica never noticed the silence"
    );
    assert_eq!(
        &client_b.read_remote("telemetry", LOCALHOST, 0).await.unwrap()[..14],
        b"position 4 5 6"
    );

    // dropping the last subscription frees the replica
    client_b
        .disconnect_remote("telemetry", LOCALHOST, 0)
        .await
        .unwrap();
    assert!(
        poll(|| async { client_b.remote_size("telemetry", LOCALHOST, 0).await.is_none() }).await,
        "replica never freed"
    );

    handle_b.stop().await;
    task_b.await.unwrap().unwrap();
}

#[tokio::test]
async fn pending_fetch_survives_until_owner_appears() {
    let dir = tempfile::tempdir().unwrap();

    // different port plane so the tests can run in parallel
    let base = 43200;
    let cfg = |id: u8| {
        ServerConfig::new(id)
            .runtime_dir(dir.path())
            .request_base_port(base)
            .multicast_base_port(base + 100)
            .multicast_group(LOCALHOST)
            .segment_size(8192)
            .sender_interval(Duration::from_millis(10))
            .inactivity_timeout(Duration::from_millis(200))
    };

    let server_b = Server::new(cfg(1)).await.unwrap();
    let client_b = Client::connect(&server_b, 0).await.unwrap();
    let handle_b = server_b.handle();
    let task_b = tokio::spawn(server_b.run());

    // fetch before the owner exists; requests go unanswered for now
    client_b.fetch_buffer("late", LOCALHOST, 0).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(client_b.remote_size("late", LOCALHOST, 0).await.is_none());

    // the owner comes up and registers; the periodic resend finds it
    let server_a = Server::new(cfg(0)).await.unwrap();
    let client_a = Client::connect(&server_a, 0).await.unwrap();
    let handle_a = server_a.handle();
    let task_a = tokio::spawn(server_a.run());
    client_a.register_buffer("late", 8).await.unwrap();

    assert!(
        poll(|| async { client_b.remote_size("late", LOCALHOST, 0).await == Some(8) }).await,
        "pending fetch never completed"
    );

    handle_a.stop().await;
    handle_b.stop().await;
    task_a.await.unwrap().unwrap();
    task_b.await.unwrap().unwrap();
}
