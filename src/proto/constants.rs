//! Protocol constants
//!
//! These values are wire-visible or shared between the server and client
//! halves, so they live in one place. Port math assumes the defaults here;
//! overriding the base ports in [`ServerConfig`](crate::server::ServerConfig)
//! is fine as long as every peer agrees.

/// Size of the shared memory segment backing each server's arena
pub const SEGMENT_SIZE: usize = 65536;

/// Maximum size of a single named buffer in bytes
pub const MAX_BUFFER_SIZE: u16 = 1024;

/// Maximum length of a buffer name in bytes
pub const MAX_NAME_SIZE: usize = 25;

/// Exact size of a control message on the queue
pub const CONTROL_MESSAGE_SIZE: usize = 32;

/// Base UDP port for the request/ACK listener; server N listens on
/// `REQUEST_BASE_PORT + N`
pub const REQUEST_BASE_PORT: u16 = 8888;

/// Base UDP port for multicast data streams
pub const MULTICAST_BASE_PORT: u16 = 30000;

/// Maximum number of servers (server IDs are 0..MAX_SERVERS)
pub const MAX_SERVERS: u8 = 16;

/// Maximum number of clients per server (client IDs are 0..MAX_CLIENTS)
pub const MAX_CLIENTS: u8 = 16;

/// Maximum number of streamed (non-local-only) buffers a single client may
/// create; bounds the multicast port range reserved per client
pub const MAX_BUFFERS_PER_CLIENT: u8 = 8;

/// Interval between sender ticks (requests, ACKs, data) in milliseconds
pub const SENDER_INTERVAL_MS: u64 = 20;

/// A remote buffer receiving no datagram for this long is marked inactive
pub const INACTIVITY_TIMEOUT_MS: u64 = 1000;

/// Largest datagram the request/ACK listener ever needs to accept
pub const RECEIVE_BUFFER_SIZE: usize = 11 + MAX_NAME_SIZE;

/// Discriminator byte for a fetch request datagram
pub const DISCRIMINATOR_REQUEST: u8 = 0;

/// Discriminator byte for an ACK datagram
pub const DISCRIMINATOR_ACK: u8 = 1;

/// Discriminator byte for the shutdown sentinel datagram; recognized only
/// to unblock a blocked receive, never otherwise processed
pub const DISCRIMINATOR_SENTINEL: u8 = 0xFF;
