//! Replica receive task
//!
//! One task per remote buffer, started when its ACK arrives. The task owns
//! the socket subscribed to the buffer's multicast group and is the only
//! writer of the replica's bytes. Silence beyond the inactivity window
//! flips the buffer inactive; the next well-sized datagram flips it back.
//! The task exits when the buffer is garbage-collected or the server shuts
//! down; there is no retransmission, the next tick's datagram heals any
//! loss.

use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::store::RemoteKey;

use super::shared::Shared;

pub(crate) async fn run(
    shared: Arc<Shared>,
    key: RemoteKey,
    group: Ipv4Addr,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) {
    let socket = match bind_group(group, port).await {
        Ok(socket) => socket,
        Err(e) => {
            tracing::error!(buffer = %key, group = %group, port, error = %e, "Failed to open replica socket");
            return;
        }
    };
    tracing::debug!(buffer = %key, group = %group, port, "Replica task started");

    // one byte of headroom so an oversized datagram is detectable
    let mut buf = vec![0u8; crate::proto::MAX_BUFFER_SIZE as usize + 1];

    loop {
        // the buffer disappearing from the map is the stop signal from the
        // disconnect path
        let Some(buffer) = shared.store.find_remote(&key).await else {
            tracing::debug!(buffer = %key, "Replica freed, stopping");
            break;
        };
        let expected = buffer.len() as usize;

        tokio::select! {
            _ = shutdown.changed() => break,
            received = timeout(shared.config.inactivity_timeout, socket.recv_from(&mut buf)) => {
                match received {
                    Err(_) => {
                        // inactivity window elapsed with no datagram
                        if buffer.set_active(false) {
                            tracing::info!(buffer = %key, "Remote buffer inactive");
                        }
                    }
                    Ok(Err(e)) => {
                        tracing::error!(buffer = %key, error = %e, "Replica receive failed");
                    }
                    Ok(Ok((n, _from))) => {
                        if n != expected {
                            tracing::warn!(buffer = %key, received = n, expected, "Dropping datagram with wrong length");
                            continue;
                        }
                        if shared.store.write_remote(&key, &buf[..n]).await.is_err() {
                            // freed between the lookup and the write
                            break;
                        }
                        if !buffer.set_active(true) {
                            tracing::info!(buffer = %key, "Remote buffer active");
                        }
                    }
                }
            }
        }
    }
    tracing::debug!(buffer = %key, "Replica task stopped");
}

/// Open the receiving socket for an announced group/port
///
/// Joins the group when the announced address is multicast; a unicast
/// address is bound directly, which keeps single-host setups working.
async fn bind_group(group: Ipv4Addr, port: u16) -> std::io::Result<UdpSocket> {
    if group.is_multicast() {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
        Ok(socket)
    } else {
        UdpSocket::bind((group, port)).await
    }
}
