//! Server configuration

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use crate::proto::constants::*;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// This server's ID (0..MAX_SERVERS); names the segment and queue and
    /// offsets the request port
    pub server_id: u8,

    /// Directory holding the named segment and queue socket
    pub runtime_dir: PathBuf,

    /// Base port for request/ACK listeners; must match across peers
    pub request_base_port: u16,

    /// Base port for multicast data streams; must match across peers
    pub multicast_base_port: u16,

    /// Multicast group buffers of this server stream to
    pub multicast_group: Ipv4Addr,

    /// Size of the shared memory segment
    pub segment_size: usize,

    /// Interval between sender ticks
    pub sender_interval: Duration,

    /// Window after which a silent remote buffer is marked inactive
    pub inactivity_timeout: Duration,

    /// Remove stale named resources left by a crashed instance before binding
    pub force: bool,
}

impl ServerConfig {
    /// Create a configuration for the given server ID with defaults
    pub fn new(server_id: u8) -> Self {
        Self {
            server_id,
            runtime_dir: std::env::temp_dir(),
            request_base_port: REQUEST_BASE_PORT,
            multicast_base_port: MULTICAST_BASE_PORT,
            multicast_group: Ipv4Addr::new(239, 255, 0, server_id.wrapping_add(1)),
            segment_size: SEGMENT_SIZE,
            sender_interval: Duration::from_millis(SENDER_INTERVAL_MS),
            inactivity_timeout: Duration::from_millis(INACTIVITY_TIMEOUT_MS),
            force: false,
        }
    }

    /// Set the runtime directory
    pub fn runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_dir = dir.into();
        self
    }

    /// Set the request base port
    pub fn request_base_port(mut self, port: u16) -> Self {
        self.request_base_port = port;
        self
    }

    /// Set the multicast base port
    pub fn multicast_base_port(mut self, port: u16) -> Self {
        self.multicast_base_port = port;
        self
    }

    /// Set the multicast group
    pub fn multicast_group(mut self, group: Ipv4Addr) -> Self {
        self.multicast_group = group;
        self
    }

    /// Set the sender tick interval
    pub fn sender_interval(mut self, interval: Duration) -> Self {
        self.sender_interval = interval;
        self
    }

    /// Set the inactivity timeout
    pub fn inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    /// Set the segment size
    pub fn segment_size(mut self, size: usize) -> Self {
        self.segment_size = size;
        self
    }

    /// Remove stale named resources before binding
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    /// Name of the segment and queue resources, `"server<ID>"`
    pub fn server_name(&self) -> String {
        format!("server{}", self.server_id)
    }

    /// UDP port this server's request/ACK listener binds
    pub fn request_port(&self) -> u16 {
        self.request_base_port + self.server_id as u16
    }

    /// Multicast port for a given client and slot index
    ///
    /// Every (server, client) pair owns a disjoint range of
    /// `MAX_BUFFERS_PER_CLIENT` ports, so streams never collide.
    pub fn multicast_port(&self, client_id: u8, slot: u8) -> u16 {
        self.multicast_base_port
            + self.server_id as u16 * MAX_CLIENTS as u16 * MAX_BUFFERS_PER_CLIENT as u16
            + client_id as u16 * MAX_BUFFERS_PER_CLIENT as u16
            + slot as u16
    }
}
