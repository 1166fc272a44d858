//! Client API
//!
//! A client talks to its local server over the named control queue and
//! reads and writes buffer bytes through the server's store directly.
//! Queue messages are processed asynchronously by the server's dispatch
//! loop, so registration and fetching take effect shortly after the call
//! returns; [`Client::local_size`] and [`Client::remote_size`] report
//! whether a buffer has materialized yet.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::proto::control::validate_name;
use crate::proto::{ControlMessage, ControlOp, Footer, MAX_BUFFER_SIZE, MAX_CLIENTS, MAX_SERVERS};
use crate::queue::QueueSender;
use crate::server::Server;
use crate::store::{BufferStore, LocalKey, RemoteKey};

/// Handle to one local server, identified by a client ID
pub struct Client {
    client_id: u8,
    server_id: u8,
    request_base_port: u16,
    store: Arc<BufferStore>,
    queue: QueueSender,
}

impl Client {
    /// Connect to a server, resetting any prior state under this client ID
    ///
    /// A crashed client that reconnects under the same ID gets its stale
    /// subscriptions torn down first.
    pub async fn connect(server: &Server, client_id: u8) -> Result<Self> {
        Self::attach(server, client_id, ControlOp::ConnectClient).await
    }

    /// Connect without resetting prior state under this client ID
    pub async fn connect_no_reset(server: &Server, client_id: u8) -> Result<Self> {
        Self::attach(server, client_id, ControlOp::ConnectClientNoReset).await
    }

    async fn attach(server: &Server, client_id: u8, op: ControlOp) -> Result<Self> {
        if client_id >= MAX_CLIENTS {
            return Err(Error::InvalidClientId(client_id));
        }
        let config = server.config();
        let client = Self {
            client_id,
            server_id: config.server_id,
            request_base_port: config.request_base_port,
            store: server.store(),
            queue: QueueSender::connect(&config.runtime_dir, &config.server_name())?,
        };
        client.send(op, String::new(), Footer::None).await?;
        tracing::debug!(client_id, server = %config.server_name(), "Client connected");
        Ok(client)
    }

    /// Register a buffer for replication, creating it if it does not exist
    pub async fn register_buffer(&self, name: &str, size: u16) -> Result<()> {
        self.check_buffer(name, size)?;
        self.send(ControlOp::CreateLocal, name.to_owned(), Footer::Size(size))
            .await
    }

    /// Register a buffer that is never streamed to peers
    pub async fn register_local_only(&self, name: &str, size: u16) -> Result<()> {
        self.check_buffer(name, size)?;
        self.send(ControlOp::CreateLocalOnly, name.to_owned(), Footer::Size(size))
            .await
    }

    /// Subscribe to a buffer owned by the peer server at `addr`
    pub async fn fetch_buffer(&self, name: &str, addr: Ipv4Addr, peer_server_id: u8) -> Result<()> {
        validate_name(name).map_err(|_| Error::InvalidName(name.to_owned()))?;
        if peer_server_id >= MAX_SERVERS {
            return Err(Error::InvalidServerId(peer_server_id));
        }
        self.send_to_peer(ControlOp::FetchRemote, name, addr, peer_server_id)
            .await
    }

    /// Drop this client's subscription to a local buffer
    pub async fn disconnect_local(&self, name: &str) -> Result<()> {
        validate_name(name).map_err(|_| Error::InvalidName(name.to_owned()))?;
        self.send(ControlOp::DisconnectLocal, name.to_owned(), Footer::None)
            .await
    }

    /// Drop this client's subscription to a remote buffer
    pub async fn disconnect_remote(
        &self,
        name: &str,
        addr: Ipv4Addr,
        peer_server_id: u8,
    ) -> Result<()> {
        validate_name(name).map_err(|_| Error::InvalidName(name.to_owned()))?;
        if peer_server_id >= MAX_SERVERS {
            return Err(Error::InvalidServerId(peer_server_id));
        }
        self.send_to_peer(ControlOp::DisconnectRemote, name, addr, peer_server_id)
            .await
    }

    /// Drop every subscription this client holds
    pub async fn close(self) -> Result<()> {
        self.send(ControlOp::DisconnectClient, String::new(), Footer::None)
            .await
    }

    /// Overwrite a local buffer's contents
    ///
    /// Data is truncated or zero-padded to the buffer's registered length.
    pub async fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        Ok(self.store.write_local(&LocalKey::new(name), data).await?)
    }

    /// Read a local buffer's contents
    pub async fn read(&self, name: &str) -> Result<Bytes> {
        Ok(self.store.read_local(&LocalKey::new(name)).await?)
    }

    /// Read a remote replica's contents
    pub async fn read_remote(
        &self,
        name: &str,
        addr: Ipv4Addr,
        peer_server_id: u8,
    ) -> Result<Bytes> {
        let key = self.remote_key(name, addr, peer_server_id);
        Ok(self.store.read_remote(&key).await?)
    }

    /// Registered size of a local buffer, or `None` if it does not exist yet
    pub async fn local_size(&self, name: &str) -> Option<u16> {
        self.store
            .find_local(&LocalKey::new(name))
            .await
            .map(|b| b.len())
    }

    /// Registered size of a remote replica, or `None` if no ACK arrived yet
    pub async fn remote_size(&self, name: &str, addr: Ipv4Addr, peer_server_id: u8) -> Option<u16> {
        self.store
            .find_remote(&self.remote_key(name, addr, peer_server_id))
            .await
            .map(|b| b.len())
    }

    /// Whether a remote replica received data within the inactivity window
    pub async fn is_remote_active(&self, name: &str, addr: Ipv4Addr, peer_server_id: u8) -> bool {
        self.store
            .find_remote(&self.remote_key(name, addr, peer_server_id))
            .await
            .is_some_and(|b| b.is_active())
    }

    fn check_buffer(&self, name: &str, size: u16) -> Result<()> {
        validate_name(name).map_err(|_| Error::InvalidName(name.to_owned()))?;
        if size == 0 || size > MAX_BUFFER_SIZE {
            return Err(Error::InvalidSize(size));
        }
        Ok(())
    }

    fn remote_key(&self, name: &str, addr: Ipv4Addr, peer_server_id: u8) -> RemoteKey {
        RemoteKey::new(
            name,
            SocketAddrV4::new(addr, self.request_base_port + peer_server_id as u16),
        )
    }

    async fn send(&self, op: ControlOp, name: String, footer: Footer) -> Result<()> {
        self.queue
            .send(&ControlMessage {
                op,
                server_id: self.server_id,
                client_id: self.client_id,
                name,
                footer,
            })
            .await
    }

    async fn send_to_peer(
        &self,
        op: ControlOp,
        name: &str,
        addr: Ipv4Addr,
        peer_server_id: u8,
    ) -> Result<()> {
        self.queue
            .send(&ControlMessage {
                op,
                server_id: peer_server_id,
                client_id: self.client_id,
                name: name.to_owned(),
                footer: Footer::Addr(addr),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerConfig;
    use std::time::Duration;

    async fn test_server(dir: &std::path::Path, request_base_port: u16) -> Server {
        let config = ServerConfig::new(0)
            .runtime_dir(dir)
            .request_base_port(request_base_port)
            .segment_size(8192)
            .sender_interval(Duration::from_millis(10));
        Server::new(config).await.unwrap()
    }

    async fn wait_for<F, Fut>(mut probe: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if probe().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_register_write_read() {
        let dir = tempfile::tempdir().unwrap();
        let server = test_server(dir.path(), 42500).await;
        let client = Client::connect(&server, 1).await.unwrap();
        let handle = server.handle();
        let task = tokio::spawn(server.run());

        client.register_buffer("scores", 16).await.unwrap();
        assert!(wait_for(|| async { client.local_size("scores").await.is_some() }).await);
        assert_eq!(client.local_size("scores").await, Some(16));

        client.write("scores", b"42").await.unwrap();
        let contents = client.read("scores").await.unwrap();
        assert_eq!(&contents[..2], b"42");

        // close() consumes the client; watch the teardown through the store
        let store = client.store.clone();
        client.close().await.unwrap();
        assert!(
            wait_for(|| async { store.find_local(&LocalKey::new("scores")).await.is_none() })
                .await
        );

        handle.stop().await;
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_validation_rejects_before_sending() {
        let dir = tempfile::tempdir().unwrap();
        let server = test_server(dir.path(), 42600).await;
        let client = Client::connect(&server, 1).await.unwrap();

        let long_name = "x".repeat(26);
        assert!(matches!(
            client.register_buffer(&long_name, 8).await,
            Err(Error::InvalidName(_))
        ));
        assert!(matches!(
            client.register_buffer("ok", 0).await,
            Err(Error::InvalidSize(0))
        ));
        assert!(matches!(
            client.register_buffer("ok", MAX_BUFFER_SIZE + 1).await,
            Err(Error::InvalidSize(_))
        ));
        assert!(matches!(
            client
                .fetch_buffer("ok", Ipv4Addr::LOCALHOST, MAX_SERVERS)
                .await,
            Err(Error::InvalidServerId(_))
        ));
        assert!(matches!(
            Client::connect(&server, MAX_CLIENTS).await,
            Err(Error::InvalidClientId(_))
        ));
    }

    #[tokio::test]
    async fn test_reconnect_resets_client_state() {
        let dir = tempfile::tempdir().unwrap();
        let server = test_server(dir.path(), 42700).await;
        let first = Client::connect(&server, 2).await.unwrap();
        let handle = server.handle();
        // store handle survives the server moving into its task
        let store = first.store.clone();
        let task = tokio::spawn(server.run());

        first.register_buffer("leftover", 8).await.unwrap();
        assert!(wait_for(|| async { first.local_size("leftover").await.is_some() }).await);

        // a reconnect under the same ID drops the old subscription
        let second = QueueSender::connect(dir.path(), "server0").unwrap();
        second
            .send(&ControlMessage {
                op: ControlOp::ConnectClient,
                server_id: 0,
                client_id: 2,
                name: String::new(),
                footer: Footer::None,
            })
            .await
            .unwrap();

        assert!(
            wait_for(|| async { store.find_local(&LocalKey::new("leftover")).await.is_none() })
                .await
        );

        handle.stop().await;
        task.await.unwrap().unwrap();
    }
}
