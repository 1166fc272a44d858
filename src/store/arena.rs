//! Arena allocator over the shared segment
//!
//! Buffers are carved out of the segment by a first-fit free-list
//! allocator. Allocations are identified by an opaque [`RegionHandle`]
//! (offset + length) rather than a pointer, since the segment may be mapped
//! at a different base address in every process.
//!
//! Raw reads and writes copy through the mapping. The allocator guarantees
//! live handles never overlap; concurrent access to a single handle is
//! serialized by the owning buffer's content lock in the store layer.

use parking_lot::Mutex;

use super::error::StoreError;
use super::segment::Segment;

/// Opaque reference to a region of the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionHandle {
    offset: u32,
    len: u32,
}

impl RegionHandle {
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct Extent {
    offset: u32,
    len: u32,
}

/// First-fit allocator over a [`Segment`]
pub struct Arena {
    _segment: Segment,
    base: *mut u8,
    size: usize,
    /// Free extents, sorted by offset, adjacent extents coalesced
    free: Mutex<Vec<Extent>>,
}

// SAFETY: `base` points into the mapping owned by `_segment`, which lives
// as long as the arena. The free list hands out disjoint extents, and the
// store layer serializes access to each extent with a per-buffer lock.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    pub fn new(mut segment: Segment) -> Self {
        let base = segment.base_ptr();
        let size = segment.len();
        Self {
            _segment: segment,
            base,
            size,
            free: Mutex::new(vec![Extent {
                offset: 0,
                len: size as u32,
            }]),
        }
    }

    /// Reserve `len` bytes; fails when no free extent is large enough
    pub fn allocate(&self, len: usize) -> Result<RegionHandle, StoreError> {
        if len == 0 || len > self.size {
            return Err(StoreError::OutOfMemory { requested: len });
        }
        let mut free = self.free.lock();
        let pos = free
            .iter()
            .position(|e| e.len as usize >= len)
            .ok_or(StoreError::OutOfMemory { requested: len })?;

        let extent = free[pos];
        let handle = RegionHandle {
            offset: extent.offset,
            len: len as u32,
        };
        if extent.len as usize == len {
            free.remove(pos);
        } else {
            free[pos] = Extent {
                offset: extent.offset + len as u32,
                len: extent.len - len as u32,
            };
        }
        Ok(handle)
    }

    /// Return a region to the free list, coalescing with its neighbors
    pub fn free(&self, handle: RegionHandle) {
        let mut free = self.free.lock();
        let pos = free
            .iter()
            .position(|e| e.offset > handle.offset)
            .unwrap_or(free.len());

        let mut extent = Extent {
            offset: handle.offset,
            len: handle.len,
        };
        // merge with the following extent
        if pos < free.len() && extent.offset + extent.len == free[pos].offset {
            extent.len += free[pos].len;
            free.remove(pos);
        }
        // merge with the preceding extent
        if pos > 0 && free[pos - 1].offset + free[pos - 1].len == extent.offset {
            free[pos - 1].len += extent.len;
        } else {
            free.insert(pos, extent);
        }
    }

    /// Copy a region's bytes into `dst`
    ///
    /// `dst` must be exactly the region's length. The caller holds the
    /// region's content lock.
    pub fn read(&self, handle: RegionHandle, dst: &mut [u8]) {
        assert_eq!(dst.len(), handle.len());
        // SAFETY: handle came from allocate() and has not been freed, so it
        // lies within the mapping and overlaps no other live region.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.base.add(handle.offset as usize),
                dst.as_mut_ptr(),
                handle.len(),
            );
        }
    }

    /// Copy `src` into a region
    ///
    /// `src` must be exactly the region's length. The caller holds the
    /// region's content lock exclusively.
    pub fn write(&self, handle: RegionHandle, src: &[u8]) {
        assert_eq!(src.len(), handle.len());
        // SAFETY: as in read(); the content lock excludes concurrent access.
        unsafe {
            std::ptr::copy_nonoverlapping(
                src.as_ptr(),
                self.base.add(handle.offset as usize),
                handle.len(),
            );
        }
    }

    /// Total bytes currently free
    pub fn free_bytes(&self) -> usize {
        self.free.lock().iter().map(|e| e.len as usize).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(size: usize) -> (tempfile::TempDir, Arena) {
        let dir = tempfile::tempdir().unwrap();
        let segment = Segment::create(dir.path(), "arena_test", size).unwrap();
        (dir, Arena::new(segment))
    }

    #[test]
    fn test_allocate_read_write() {
        let (_dir, arena) = arena(4096);
        let handle = arena.allocate(16).unwrap();

        arena.write(handle, b"0123456789abcdef");
        let mut out = [0u8; 16];
        arena.read(handle, &mut out);
        assert_eq!(&out, b"0123456789abcdef");
    }

    #[test]
    fn test_exhaustion() {
        let (_dir, arena) = arena(4096);
        let _a = arena.allocate(4000).unwrap();
        assert!(matches!(
            arena.allocate(200),
            Err(StoreError::OutOfMemory { requested: 200 })
        ));
    }

    #[test]
    fn test_free_coalesces() {
        let (_dir, arena) = arena(4096);
        let a = arena.allocate(1024).unwrap();
        let b = arena.allocate(1024).unwrap();
        let c = arena.allocate(1024).unwrap();

        arena.free(a);
        arena.free(c);
        // a and c are not adjacent, so a 3072-byte request must still fail
        assert!(arena.allocate(3072).is_err());

        arena.free(b);
        // now everything coalesces back into one extent
        assert!(arena.allocate(4096).is_ok());
    }

    #[test]
    fn test_disjoint_regions() {
        let (_dir, arena) = arena(4096);
        let a = arena.allocate(8).unwrap();
        let b = arena.allocate(8).unwrap();

        arena.write(a, b"aaaaaaaa");
        arena.write(b, b"bbbbbbbb");

        let mut out = [0u8; 8];
        arena.read(a, &mut out);
        assert_eq!(&out, b"aaaaaaaa");
        arena.read(b, &mut out);
        assert_eq!(&out, b"bbbbbbbb");
    }

    #[test]
    fn test_zero_allocation_rejected() {
        let (_dir, arena) = arena(4096);
        assert!(arena.allocate(0).is_err());
    }
}
