//! Named control queue
//!
//! Clients talk to their local server through a named datagram queue,
//! `"server<ID>_queue"` in the runtime directory, realized as a unix
//! datagram socket. Every message is exactly
//! [`CONTROL_MESSAGE_SIZE`](crate::proto::CONTROL_MESSAGE_SIZE) bytes; a
//! zero-length datagram is the shutdown sentinel that terminates the
//! server's dispatch loop. The receiving side owns the socket file and
//! unlinks it when dropped.

use std::path::{Path, PathBuf};

use tokio::net::UnixDatagram;

use crate::proto::{ControlMessage, ProtoError, CONTROL_MESSAGE_SIZE};

/// What one receive call produced
#[derive(Debug)]
pub enum QueueEvent {
    /// A well-formed control message
    Message(ControlMessage),
    /// A malformed or wrong-sized message, logged and dropped by the caller
    Malformed(ProtoError),
    /// The zero-length shutdown sentinel
    Shutdown,
}

/// Receiving end of the control queue; owned by the server
pub struct ControlQueue {
    socket: UnixDatagram,
    path: PathBuf,
}

impl ControlQueue {
    /// Queue socket path for a given server name
    pub fn path_for(dir: &Path, server_name: &str) -> PathBuf {
        dir.join(format!("{}_queue", server_name))
    }

    /// Bind the named queue; fails if it already exists
    pub fn bind(dir: &Path, server_name: &str) -> std::io::Result<Self> {
        let path = Self::path_for(dir, server_name);
        let socket = UnixDatagram::bind(&path)?;
        Ok(Self { socket, path })
    }

    /// Unlink a stale queue socket; absent is not an error
    pub fn remove(dir: &Path, server_name: &str) -> std::io::Result<()> {
        match std::fs::remove_file(Self::path_for(dir, server_name)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.path
    }

    /// Receive one queue datagram
    pub async fn recv(&self) -> std::io::Result<QueueEvent> {
        let mut buf = [0u8; CONTROL_MESSAGE_SIZE];
        let n = self.socket.recv(&mut buf).await?;
        if n == 0 {
            return Ok(QueueEvent::Shutdown);
        }
        if n != CONTROL_MESSAGE_SIZE {
            return Ok(QueueEvent::Malformed(ProtoError::Truncated {
                got: n,
                need: CONTROL_MESSAGE_SIZE,
            }));
        }
        match ControlMessage::decode(&buf) {
            Ok(msg) => Ok(QueueEvent::Message(msg)),
            Err(e) => Ok(QueueEvent::Malformed(e)),
        }
    }
}

impl Drop for ControlQueue {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to unlink queue socket");
            }
        }
    }
}

/// Sending end of the control queue; used by clients and by
/// [`ServerHandle::stop`](crate::server::ServerHandle::stop)
pub struct QueueSender {
    socket: UnixDatagram,
    path: PathBuf,
}

impl QueueSender {
    /// Connect to an existing named queue
    pub fn connect(dir: &Path, server_name: &str) -> std::io::Result<Self> {
        let path = ControlQueue::path_for(dir, server_name);
        let socket = UnixDatagram::unbound()?;
        Ok(Self { socket, path })
    }

    /// Send one control message
    pub async fn send(&self, msg: &ControlMessage) -> crate::error::Result<()> {
        let wire = msg.encode()?;
        self.socket.send_to(&wire, &self.path).await?;
        Ok(())
    }

    /// Send the zero-length shutdown sentinel
    pub async fn send_shutdown(&self) -> std::io::Result<()> {
        self.socket.send_to(&[], &self.path).await?;
        Ok(())
    }
}
