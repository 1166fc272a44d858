//! Replication server
//!
//! One [`Server`] per host per server ID. The engine owns the shared
//! memory segment and the control queue, runs the control dispatch loop,
//! and spawns the sender and receiver tasks plus one receive task per
//! remote replica. See the crate docs for the replication handshake.

mod config;
mod dispatch;
mod engine;
mod receiver;
mod replicate;
mod sender;
mod shared;
mod subscriptions;

pub use config::ServerConfig;
pub use engine::{Server, ServerHandle};
