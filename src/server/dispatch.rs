//! Control dispatch
//!
//! One message per iteration, driven by the server's main loop. All
//! subscription state lives here and is touched by no other task; only the
//! store and the pending sets are shared.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use crate::proto::control::validate_name;
use crate::proto::{ControlMessage, ControlOp, Footer, MAX_BUFFER_SIZE, MAX_SERVERS};
use crate::store::{LocalKey, RemoteKey, StoreError};

use super::shared::Shared;
use super::subscriptions::{Removal, SubscriptionTable};

pub(crate) struct Dispatch {
    shared: Arc<Shared>,
    subs: SubscriptionTable,
}

impl Dispatch {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            subs: SubscriptionTable::new(),
        }
    }

    pub(crate) async fn handle(&mut self, msg: ControlMessage) {
        if validate_name(&msg.name).is_err()
            && !matches!(
                msg.op,
                ControlOp::DisconnectClient | ControlOp::ConnectClient | ControlOp::ConnectClientNoReset
            )
        {
            tracing::warn!(op = ?msg.op, "Dropping message with invalid name");
            return;
        }

        match msg.op {
            ControlOp::CreateLocal => {
                self.create_local_buffer(msg.name, size_of(&msg.footer), msg.client_id, false)
                    .await;
            }
            ControlOp::CreateLocalOnly => {
                self.create_local_buffer(msg.name, size_of(&msg.footer), msg.client_id, true)
                    .await;
            }
            ControlOp::FetchRemote => {
                let Footer::Addr(addr) = msg.footer else {
                    tracing::warn!("FETCH_REMOTE without peer address");
                    return;
                };
                self.fetch_remote_buffer(msg.name, addr, msg.client_id, msg.server_id)
                    .await;
            }
            ControlOp::DisconnectLocal => {
                self.disconnect_local(msg.name, msg.client_id).await;
            }
            ControlOp::DisconnectRemote => {
                let Footer::Addr(addr) = msg.footer else {
                    tracing::warn!("DISCONNECT_REMOTE without peer address");
                    return;
                };
                self.disconnect_remote(msg.name, addr, msg.client_id, msg.server_id)
                    .await;
            }
            ControlOp::DisconnectClient | ControlOp::ConnectClient => {
                tracing::info!(client_id = msg.client_id, "Client disconnected");
                self.disconnect_client(msg.client_id).await;
            }
            ControlOp::ConnectClientNoReset => {
                tracing::debug!(client_id = msg.client_id, "Client connected");
            }
        }
    }

    /// Create a local buffer, or just add a listener when it already exists
    pub(crate) async fn create_local_buffer(
        &mut self,
        name: String,
        size: u16,
        client_id: u8,
        local_only: bool,
    ) {
        let key = LocalKey::new(name);
        tracing::info!(buffer = %key, size, client_id, local_only, "Create local buffer");

        // re-registration only updates the listener set
        if self.shared.store.find_local(&key).await.is_some() {
            self.subs.add_local(&key, client_id);
            return;
        }

        if size == 0 || size > MAX_BUFFER_SIZE {
            tracing::warn!(buffer = %key, size, "Rejecting buffer with invalid size");
            return;
        }

        let multicast = if local_only {
            // port 0: never streamed
            SocketAddrV4::new(self.shared.config.multicast_group, 0)
        } else {
            let Some(slot) = self.subs.available_slot(client_id) else {
                tracing::error!(client_id, "Client has too many streamed buffers");
                return;
            };
            SocketAddrV4::new(
                self.shared.config.multicast_group,
                self.shared.config.multicast_port(client_id, slot),
            )
        };

        match self.shared.store.allocate_local(key.clone(), size, multicast).await {
            Ok(_) => {
                if !local_only {
                    self.subs.take_slot(client_id);
                }
                self.subs.add_local(&key, client_id);
            }
            Err(e @ StoreError::OutOfMemory { .. }) => {
                tracing::error!(buffer = %key, error = %e, "Failed to allocate buffer");
            }
            Err(e) => {
                tracing::error!(buffer = %key, error = %e, "Unexpected allocation failure");
            }
        }
    }

    /// Record interest in a peer's buffer and queue a fetch if we are not
    /// already replicating it
    pub(crate) async fn fetch_remote_buffer(
        &mut self,
        name: String,
        addr: Ipv4Addr,
        client_id: u8,
        peer_server_id: u8,
    ) {
        if peer_server_id >= MAX_SERVERS {
            tracing::warn!(peer_server_id, "Rejecting fetch with invalid peer ID");
            return;
        }
        let endpoint = SocketAddrV4::new(
            addr,
            self.shared.config.request_base_port + peer_server_id as u16,
        );
        let key = RemoteKey::new(name, endpoint);
        tracing::info!(buffer = %key, client_id, "Fetch remote buffer");

        self.subs.add_remote(&key, client_id);

        if self.shared.store.find_remote(&key).await.is_some() {
            // already replicating
            return;
        }
        self.shared.pending_fetch.write().await.insert(key);
    }

    pub(crate) async fn disconnect_local(&mut self, name: String, client_id: u8) {
        let key = LocalKey::new(name);
        tracing::info!(buffer = %key, client_id, "Disconnect local listener");
        match self.subs.remove_local(&key, client_id) {
            Removal::Unknown => {
                tracing::warn!(buffer = %key, "Disconnect from unknown local buffer");
            }
            Removal::Remaining => {}
            Removal::Empty => {
                tracing::info!(buffer = %key, "Removing local buffer");
                self.shared.store.free_local(&key).await;
            }
        }
    }

    pub(crate) async fn disconnect_remote(
        &mut self,
        name: String,
        addr: Ipv4Addr,
        client_id: u8,
        peer_server_id: u8,
    ) {
        let endpoint = SocketAddrV4::new(
            addr,
            self.shared.config.request_base_port + peer_server_id as u16,
        );
        let key = RemoteKey::new(name, endpoint);
        tracing::info!(buffer = %key, client_id, "Disconnect remote listener");
        match self.subs.remove_remote(&key, client_id) {
            Removal::Unknown => {
                tracing::warn!(buffer = %key, "Disconnect from unknown remote buffer");
            }
            Removal::Remaining => {}
            Removal::Empty => self.remove_remote_buffer(&key).await,
        }
    }

    /// Tear down everything a client subscribed to
    pub(crate) async fn disconnect_client(&mut self, client_id: u8) {
        let record = self.subs.take_client(client_id);
        for key in record.local {
            if self.subs.remove_local(&key, client_id) == Removal::Empty {
                tracing::info!(buffer = %key, "Removing local buffer");
                self.shared.store.free_local(&key).await;
            }
        }
        for key in record.remote {
            if self.subs.remove_remote(&key, client_id) == Removal::Empty {
                self.remove_remote_buffer(&key).await;
            }
        }
    }

    /// GC a remote buffer: cancel an unanswered fetch, otherwise free the
    /// replica (its receive task notices and exits)
    async fn remove_remote_buffer(&self, key: &RemoteKey) {
        if self.shared.pending_fetch.write().await.remove(key) {
            tracing::info!(buffer = %key, "Cancelled pending fetch");
            return;
        }
        tracing::info!(buffer = %key, "Removing remote buffer");
        self.shared.store.free_remote(key).await;
    }

    #[cfg(test)]
    pub(crate) fn subscriptions(&self) -> &SubscriptionTable {
        &self.subs
    }
}

fn size_of(footer: &Footer) -> u16 {
    match footer {
        Footer::Size(size) => *size,
        _ => 0,
    }
}
