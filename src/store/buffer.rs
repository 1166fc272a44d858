//! Buffer types stored in the maps
//!
//! Both kinds carry an arena handle, a declared length, and their own
//! content lock; the map lock protects only map structure. Local buffers
//! additionally know where they stream (multicast port 0 = local-only,
//! never streamed); remote buffers carry the liveness flag maintained by
//! the replica receive task.

use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;

use super::arena::RegionHandle;

/// A buffer owned by this server
pub struct LocalBuffer {
    pub(super) handle: RegionHandle,
    len: u16,
    /// Content lock: shared for reads, exclusive for writes
    pub(crate) lock: RwLock<()>,
    /// Multicast destination; port 0 means local-only
    multicast: SocketAddrV4,
}

impl LocalBuffer {
    pub(super) fn new(handle: RegionHandle, len: u16, multicast: SocketAddrV4) -> Self {
        Self {
            handle,
            len,
            lock: RwLock::new(()),
            multicast,
        }
    }

    pub fn len(&self) -> u16 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn multicast(&self) -> SocketAddrV4 {
        self.multicast
    }

    /// Whether this buffer is ever streamed to peers
    pub fn is_local_only(&self) -> bool {
        self.multicast.port() == 0
    }
}

/// A replica of a buffer owned by a peer server
pub struct RemoteBuffer {
    pub(super) handle: RegionHandle,
    len: u16,
    /// Content lock: shared for reads, exclusive for writes
    pub(crate) lock: RwLock<()>,
    /// True only while datagrams keep arriving within the inactivity window
    active: AtomicBool,
}

impl RemoteBuffer {
    pub(super) fn new(handle: RegionHandle, len: u16) -> Self {
        Self {
            handle,
            len,
            lock: RwLock::new(()),
            active: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> u16 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Flip the liveness flag, returning the previous value
    pub(crate) fn set_active(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::AcqRel)
    }
}
