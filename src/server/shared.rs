//! State shared between the dispatch loop and the background tasks
//!
//! The pending-fetch set and pending-ACK map each carry their own lock
//! because the dispatch, sender, and receiver tasks all touch them. By
//! convention these locks never nest with the store's map locks: callers
//! finish with one family before acquiring the other.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddrV4;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use crate::store::{BufferStore, LocalKey, RemoteKey};

use super::config::ServerConfig;

pub(crate) struct Shared {
    pub config: ServerConfig,
    pub store: Arc<BufferStore>,

    /// Remote keys requested but not yet ACKed; set semantics deduplicate
    /// concurrent fetches
    pub pending_fetch: RwLock<HashSet<RemoteKey>>,

    /// Local buffer name → peer endpoints awaiting an ACK; populated by the
    /// receiver, drained by the sender
    pub pending_acks: RwLock<HashMap<LocalKey, Vec<SocketAddrV4>>>,

    /// Socket used for all outbound requests, ACKs, and data
    pub send_socket: UdpSocket,

    /// Replica receive tasks, joined at shutdown
    pub replicas: parking_lot::Mutex<Vec<JoinHandle<()>>>,

    /// Cooperative shutdown signal observed by every loop
    pub shutdown: watch::Receiver<bool>,
}

impl Shared {
    pub(crate) async fn new(
        config: ServerConfig,
        store: Arc<BufferStore>,
        shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<Self> {
        let send_socket = UdpSocket::bind("0.0.0.0:0").await?;
        // deliver our own multicast to local subscribers too
        send_socket.set_multicast_loop_v4(true)?;
        Ok(Self {
            config,
            store,
            pending_fetch: RwLock::new(HashSet::new()),
            pending_acks: RwLock::new(HashMap::new()),
            send_socket,
            replicas: parking_lot::Mutex::new(Vec::new()),
            shutdown,
        })
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}
