//! Shared buffer store
//!
//! The store owns the named shared memory segment, an arena allocator over
//! it, and the two key→buffer maps (local and remote). Locking discipline:
//!
//! - each map has a reader/writer lock protecting structure only;
//! - each buffer has its own content lock, shared for reads and exclusive
//!   for writes, acquired after the map lock has been released;
//! - map locks and the server's pending-set locks never nest.
//!
//! Buffer contents live in the segment so any process mapping it can read
//! them; all addressing is by [`RegionHandle`], never by pointer.

pub mod arena;
pub mod buffer;
pub mod error;
pub mod key;
pub mod segment;
#[allow(clippy::module_inception)]
pub mod store;

pub use arena::{Arena, RegionHandle};
pub use buffer::{LocalBuffer, RemoteBuffer};
pub use error::StoreError;
pub use key::{LocalKey, RemoteKey};
pub use segment::Segment;
pub use store::BufferStore;
