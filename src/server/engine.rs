//! Server engine
//!
//! Owns the named resources and the task set. [`Server::run`] drives the
//! control dispatch loop on the current task and spawns the sender and
//! receiver beside it; replica tasks come and go as ACKs arrive and
//! buffers are garbage-collected. Shutdown is cooperative: the watch
//! channel flips, the queue gets its zero-length sentinel, and the request
//! socket gets a sentinel datagram so nothing stays blocked in a receive.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::proto::{Datagram, MAX_SERVERS};
use crate::queue::{ControlQueue, QueueEvent, QueueSender};
use crate::store::{BufferStore, Segment};

use super::config::ServerConfig;
use super::dispatch::Dispatch;
use super::shared::Shared;
use super::{receiver, sender};

/// One server instance: segment, control queue, and network tasks
pub struct Server {
    shared: Arc<Shared>,
    queue: ControlQueue,
    request_socket: UdpSocket,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Server {
    /// Create the named resources and bind the request port
    ///
    /// With [`ServerConfig::force`] set, stale segment and queue files left
    /// by a crashed instance are removed first.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        if config.server_id >= MAX_SERVERS {
            return Err(Error::InvalidServerId(config.server_id));
        }
        let name = config.server_name();

        if config.force {
            tracing::warn!(server = %name, "Removing stale named resources");
            Segment::remove(&config.runtime_dir, &name)?;
            ControlQueue::remove(&config.runtime_dir, &name)?;
        }

        let segment = Segment::create(&config.runtime_dir, &name, config.segment_size)?;
        let store = Arc::new(BufferStore::new(segment));
        let queue = ControlQueue::bind(&config.runtime_dir, &name)?;
        let request_socket =
            UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.request_port())).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(Shared::new(config, store, shutdown_rx).await?);

        tracing::info!(
            server = %name,
            port = shared.config.request_port(),
            queue = %queue.socket_path().display(),
            "Server initialized"
        );

        Ok(Self {
            shared,
            queue,
            request_socket,
            shutdown_tx: Arc::new(shutdown_tx),
        })
    }

    /// Handle for stopping the server from another task
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: Arc::clone(&self.shutdown_tx),
            runtime_dir: self.shared.config.runtime_dir.clone(),
            server_name: self.shared.config.server_name(),
            request_port: self.shared.config.request_port(),
        }
    }

    /// The store backing this server's segment, shared with local clients
    pub fn store(&self) -> Arc<BufferStore> {
        Arc::clone(&self.shared.store)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Run until stopped
    ///
    /// Consumes the server; the dispatch loop runs here while the sender
    /// and receiver run as spawned tasks. Returns once every task has been
    /// joined and the named resources are unlinked.
    pub async fn run(self) -> Result<()> {
        let sender_task = tokio::spawn(sender::run(
            Arc::clone(&self.shared),
            self.shared.shutdown.clone(),
        ));
        let receiver_task = tokio::spawn(receiver::run(
            Arc::clone(&self.shared),
            self.request_socket,
            self.shared.shutdown.clone(),
        ));

        let mut dispatch = Dispatch::new(Arc::clone(&self.shared));
        let mut shutdown = self.shared.shutdown.clone();
        loop {
            tokio::select! {
                event = self.queue.recv() => match event {
                    Ok(QueueEvent::Message(msg)) => dispatch.handle(msg).await,
                    Ok(QueueEvent::Malformed(e)) => {
                        tracing::warn!(error = %e, "Dropping malformed queue message");
                    }
                    Ok(QueueEvent::Shutdown) => {
                        tracing::info!("Received shutdown");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Queue receive failed");
                        break;
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        let _ = self.shutdown_tx.send(true);

        if let Err(e) = sender_task.await {
            tracing::error!(error = %e, "Sender task panicked");
        }
        if let Err(e) = receiver_task.await {
            tracing::error!(error = %e, "Receiver task panicked");
        }
        let replicas = std::mem::take(&mut *self.shared.replicas.lock());
        for task in replicas {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Replica task panicked");
            }
        }

        tracing::info!("Server stopped");
        Ok(())
    }
}

/// Remote control for a running [`Server`]
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: Arc<watch::Sender<bool>>,
    runtime_dir: PathBuf,
    server_name: String,
    request_port: u16,
}

impl ServerHandle {
    /// Stop the server and unblock its receive loops
    ///
    /// Flips the shutdown signal, then pokes both blocking receives: a
    /// sentinel datagram at the request port and a zero-length datagram at
    /// the control queue. All of it is best-effort; a server that already
    /// exited simply ignores the pokes.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);

        if let Ok(socket) = UdpSocket::bind("127.0.0.1:0").await {
            if let Ok(wire) = Datagram::Sentinel.encode() {
                let _ = socket
                    .send_to(&wire, ("127.0.0.1", self.request_port))
                    .await;
            }
        }

        if let Ok(sender) = QueueSender::connect(&self.runtime_dir, &self.server_name) {
            let _ = sender.send_shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{ControlMessage, ControlOp, Footer};
    use crate::store::LocalKey;
    use std::time::Duration;

    fn test_config(dir: &std::path::Path, request_base_port: u16) -> ServerConfig {
        ServerConfig::new(0)
            .runtime_dir(dir)
            .request_base_port(request_base_port)
            .segment_size(8192)
            .sender_interval(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_invalid_server_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::new(MAX_SERVERS).runtime_dir(dir.path());
        assert!(matches!(
            Server::new(config).await,
            Err(Error::InvalidServerId(_))
        ));
    }

    #[tokio::test]
    async fn test_second_instance_fails_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let first = Server::new(test_config(dir.path(), 42100)).await.unwrap();

        // same ID, different port, still collides on the named resources
        let collision = Server::new(test_config(dir.path(), 42110)).await;
        assert!(collision.is_err());
        drop(first);
    }

    #[tokio::test]
    async fn test_force_replaces_stale_resources() {
        let dir = tempfile::tempdir().unwrap();

        // fake leftovers from a crashed instance
        std::fs::write(dir.path().join("server0"), [0u8; 64]).unwrap();
        let config = test_config(dir.path(), 42200);
        assert!(Server::new(config.clone()).await.is_err());

        let server = Server::new(config.force()).await.unwrap();
        drop(server);
    }

    #[tokio::test]
    async fn test_queue_message_reaches_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let server = Server::new(test_config(dir.path(), 42300)).await.unwrap();
        let store = server.store();
        let handle = server.handle();
        let task = tokio::spawn(server.run());

        let sender = QueueSender::connect(dir.path(), "server0").unwrap();
        sender
            .send(&ControlMessage {
                op: ControlOp::CreateLocal,
                server_id: 0,
                client_id: 1,
                name: "engine_test".into(),
                footer: Footer::Size(16),
            })
            .await
            .unwrap();

        // dispatch runs on the server task; poll for the result
        let key = LocalKey::new("engine_test");
        let mut created = false;
        for _ in 0..50 {
            if store.find_local(&key).await.is_some() {
                created = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(created);

        handle.stop().await;
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stop_unlinks_named_resources() {
        let dir = tempfile::tempdir().unwrap();
        let server = Server::new(test_config(dir.path(), 42400)).await.unwrap();
        let handle = server.handle();
        let task = tokio::spawn(server.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;
        task.await.unwrap().unwrap();

        assert!(!dir.path().join("server0").exists());
        assert!(!dir.path().join("server0_queue").exists());
    }
}
