//! Receiver task
//!
//! Blocks on the request port and dispatches inbound peer datagrams by
//! their discriminator byte. Requests only queue an endpoint for the next
//! sender tick; ACKs allocate the replica and start its receive task. The
//! sentinel exists to unblock the receive during shutdown and is dropped.

use std::net::{IpAddr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::proto::{Datagram, MAX_BUFFER_SIZE, RECEIVE_BUFFER_SIZE};
use crate::store::{LocalKey, RemoteKey};

use super::replicate;
use super::shared::Shared;

pub(crate) async fn run(shared: Arc<Shared>, socket: UdpSocket, mut shutdown: watch::Receiver<bool>) {
    tracing::debug!("Receiver task started");
    let mut buf = [0u8; RECEIVE_BUFFER_SIZE];
    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => match result {
                Ok((n, from)) => {
                    if shared.is_shutting_down() {
                        break;
                    }
                    handle_datagram(&shared, &buf[..n], from).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Receive failed");
                }
            },
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!("Receiver task stopped");
}

pub(crate) async fn handle_datagram(shared: &Arc<Shared>, buf: &[u8], from: SocketAddr) {
    match Datagram::decode(buf) {
        Ok(Datagram::Request { server_id, name }) => {
            process_request(shared, server_id, name, from).await;
        }
        Ok(Datagram::Ack {
            server_id,
            buffer_len,
            multicast_addr,
            multicast_port,
            name,
        }) => {
            process_ack(
                shared,
                server_id,
                name,
                buffer_len,
                multicast_addr,
                multicast_port,
                from,
            )
            .await;
        }
        Ok(Datagram::Sentinel) => {
            tracing::trace!("Ignoring sentinel packet");
        }
        Err(e) => {
            tracing::warn!(peer = %from, error = %e, "Dropping malformed datagram");
        }
    }
}

/// Resolve the peer's request endpoint from its source address and
/// announced server ID
fn peer_endpoint(shared: &Shared, from: SocketAddr, server_id: u8) -> Option<SocketAddrV4> {
    match from.ip() {
        IpAddr::V4(addr) => Some(SocketAddrV4::new(
            addr,
            shared.config.request_base_port + server_id as u16,
        )),
        IpAddr::V6(_) => None,
    }
}

/// A peer wants one of our buffers announced; queue it for the next
/// sender tick. No allocation and no reply happen here.
async fn process_request(shared: &Arc<Shared>, server_id: u8, name: String, from: SocketAddr) {
    let Some(reply_to) = peer_endpoint(shared, from, server_id) else {
        tracing::warn!(peer = %from, "Ignoring request from non-IPv4 peer");
        return;
    };
    let key = LocalKey::new(name);

    if shared.store.find_local(&key).await.is_none() {
        tracing::warn!(buffer = %key, peer = %reply_to, "Requested buffer not found");
        return;
    }

    tracing::info!(buffer = %key, peer = %reply_to, "Received request");
    shared
        .pending_acks
        .write()
        .await
        .entry(key)
        .or_default()
        .push(reply_to);
}

/// A peer answered one of our fetches; allocate the replica and start
/// receiving its stream
async fn process_ack(
    shared: &Arc<Shared>,
    server_id: u8,
    name: String,
    buffer_len: u16,
    multicast_addr: std::net::Ipv4Addr,
    multicast_port: u16,
    from: SocketAddr,
) {
    let Some(endpoint) = peer_endpoint(shared, from, server_id) else {
        tracing::warn!(peer = %from, "Ignoring ACK from non-IPv4 peer");
        return;
    };
    let key = RemoteKey::new(name, endpoint);

    // a nonsense length must not consume the pending entry
    if buffer_len == 0 || buffer_len > MAX_BUFFER_SIZE {
        tracing::warn!(buffer = %key, len = buffer_len, "Ignoring ACK with invalid length");
        return;
    }

    // stale or duplicate ACKs match nothing and create nothing
    if !shared.pending_fetch.write().await.remove(&key) {
        tracing::debug!(buffer = %key, "Ignoring unexpected ACK");
        return;
    }

    tracing::info!(buffer = %key, len = buffer_len, group = %multicast_addr, port = multicast_port, "Received ACK");

    if let Err(e) = shared.store.allocate_remote(key.clone(), buffer_len).await {
        // keep the fetch pending so the sender retries once space frees up
        tracing::error!(buffer = %key, error = %e, "Failed to allocate replica");
        shared.pending_fetch.write().await.insert(key);
        return;
    }

    let task = tokio::spawn(replicate::run(
        Arc::clone(shared),
        key,
        multicast_addr,
        multicast_port,
        shared.shutdown.clone(),
    ));
    let mut replicas = shared.replicas.lock();
    // reap handles of tasks that exited when their buffer was freed
    replicas.retain(|t| !t.is_finished());
    replicas.push(task);
}
