//! Distributed shared memory middleware
//!
//! Named byte buffers live in a shared memory segment and replicate across
//! hosts over UDP. Each host runs one server per server ID; clients talk to
//! their local server over a named control queue and read buffer bytes
//! straight from the segment.
//!
//! # Architecture
//!
//! ```text
//!   host A                                   host B
//!  ┌──────────────────────────┐             ┌──────────────────────────┐
//!  │ [Client]──queue──►Server │             │ Server◄──queue──[Client] │
//!  │                     │    │  request    │    │                     │
//!  │   segment ◄── store │◄───┼─────────────┼────│ store ──► segment   │
//!  │                     │    │    ACK      │    │                     │
//!  │        sender task ─┼────┼────────────►│─ replica task            │
//!  │                     │    │  multicast  │    │                     │
//!  └──────────────────────────┘   stream    └──────────────────────────┘
//! ```
//!
//! A buffer exists exactly as long as clients are subscribed to it. To pull
//! a peer's buffer, the server unicasts a request to the peer's request
//! port until an ACK arrives carrying the buffer's length and multicast
//! coordinates; it then allocates a replica and spawns a task that receives
//! the peer's periodic multicast stream. Silence beyond the inactivity
//! window marks the replica inactive until data resumes.
//!
//! # Example
//!
//! ```no_run
//! use dsm_rs::{Client, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> dsm_rs::Result<()> {
//!     let server = Server::new(ServerConfig::new(0)).await?;
//!     let client = Client::connect(&server, 0).await?;
//!     let handle = server.handle();
//!     tokio::spawn(server.run());
//!
//!     client.register_buffer("telemetry", 64).await?;
//!     client.write("telemetry", b"position: 1.0 2.0 3.0").await?;
//!
//!     handle.stop().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod proto;
pub mod queue;
pub mod server;
pub mod store;

pub use client::Client;
pub use error::{Error, Result};
pub use server::{Server, ServerConfig, ServerHandle};
pub use store::BufferStore;
