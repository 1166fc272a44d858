//! Wire protocol types
//!
//! Two message families cross process and host boundaries:
//!
//! - [`ControlMessage`]: fixed 32-byte commands from clients to their local
//!   server, carried on the named control queue.
//! - [`Datagram`]: request/ACK/sentinel packets exchanged between peer
//!   servers on the request port. Buffer contents themselves travel as raw
//!   datagrams on per-buffer multicast groups and have no framing beyond
//!   their announced length.
//!
//! Layouts are frozen for interoperability; see the module docs of
//! [`control`] and [`datagram`] for the exact byte offsets.

pub mod constants;
pub mod control;
pub mod datagram;
pub mod error;

pub use constants::*;
pub use control::{ControlMessage, ControlOp, Footer};
pub use datagram::Datagram;
pub use error::ProtoError;
