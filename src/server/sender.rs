//! Sender task
//!
//! Runs for the server's lifetime on a fixed tick. Every tick performs
//! three passes: re-send outstanding fetch requests, answer queued ACKs,
//! and stream every streamable local buffer to its multicast group.
//! Replication is best-effort; the periodic resend is the only recovery
//! mechanism.

use std::sync::Arc;

use tokio::sync::watch;

use crate::proto::Datagram;

use super::shared::Shared;

pub(crate) async fn run(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    tracing::debug!("Sender task started");
    let mut ticker = tokio::time::interval(shared.config.sender_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                send_requests(&shared).await;
                send_acks(&shared).await;
                send_data(&shared).await;
            }
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!("Sender task stopped");
}

/// One unicast request per pending-fetch entry, aimed at the owning peer
async fn send_requests(shared: &Shared) {
    let pending = shared.pending_fetch.read().await;
    for key in pending.iter() {
        let request = Datagram::Request {
            server_id: shared.config.server_id,
            name: key.name.clone(),
        };
        let wire = match request.encode() {
            Ok(wire) => wire,
            Err(e) => {
                tracing::error!(buffer = %key, error = %e, "Failed to encode request");
                continue;
            }
        };
        tracing::trace!(buffer = %key, "Sending request");
        if let Err(e) = shared.send_socket.send_to(&wire, key.endpoint).await {
            tracing::error!(buffer = %key, error = %e, "Failed to send request");
        }
    }
}

/// Answer every queued request with the buffer's multicast coordinates
///
/// The pending map is drained before the store lookups so the pending lock
/// and the map lock are never held together.
async fn send_acks(shared: &Shared) {
    let drained = {
        let mut acks = shared.pending_acks.write().await;
        std::mem::take(&mut *acks)
    };

    for (key, requesters) in drained {
        let Some(buffer) = shared.store.find_local(&key).await else {
            tracing::warn!(buffer = %key, "Dropping ACK for unknown buffer");
            continue;
        };
        if buffer.is_local_only() {
            tracing::warn!(buffer = %key, "Buffer is local-only, not announcing");
            continue;
        }

        let ack = Datagram::Ack {
            server_id: shared.config.server_id,
            buffer_len: buffer.len(),
            multicast_addr: *buffer.multicast().ip(),
            multicast_port: buffer.multicast().port(),
            name: key.name.clone(),
        };
        let wire = match ack.encode() {
            Ok(wire) => wire,
            Err(e) => {
                tracing::error!(buffer = %key, error = %e, "Failed to encode ACK");
                continue;
            }
        };
        for endpoint in requesters {
            tracing::debug!(buffer = %key, peer = %endpoint, "Sending ACK");
            if let Err(e) = shared.send_socket.send_to(&wire, endpoint).await {
                tracing::error!(buffer = %key, peer = %endpoint, error = %e, "Failed to send ACK");
            }
        }
    }
}

/// Stream the current contents of every streamable local buffer
async fn send_data(shared: &Shared) {
    for (key, buffer) in shared.store.local_buffers().await {
        if buffer.is_local_only() {
            continue;
        }
        let contents = shared.store.read_local_buffer(&buffer).await;
        tracing::trace!(buffer = %key, dest = %buffer.multicast(), "Streaming data");
        if let Err(e) = shared.send_socket.send_to(&contents, buffer.multicast()).await {
            tracing::error!(buffer = %key, error = %e, "Failed to stream data");
        }
    }
}
