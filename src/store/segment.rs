//! Named shared memory segment
//!
//! A fixed-size file-backed mapping named `server<ID>` in the runtime
//! directory. The server creates and owns it; clients and other processes
//! map the same file to see buffer contents. The creating side unlinks the
//! file on clean shutdown.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use super::error::StoreError;

/// A named file-backed shared memory mapping
pub struct Segment {
    path: PathBuf,
    map: MmapMut,
    /// Whether this handle created the file and must unlink it
    owner: bool,
}

impl Segment {
    /// Create a new segment file of `size` bytes; fails if it already exists
    pub fn create(dir: &Path, name: &str, size: usize) -> Result<Self, StoreError> {
        let path = dir.join(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.set_len(size as u64)?;
        let map = Self::map(&file)?;
        Ok(Self {
            path,
            map,
            owner: true,
        })
    }

    /// Map an existing segment file
    pub fn open(dir: &Path, name: &str) -> Result<Self, StoreError> {
        let path = dir.join(name);
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let map = Self::map(&file)?;
        Ok(Self {
            path,
            map,
            owner: false,
        })
    }

    /// Unlink a stale segment file; absent is not an error
    pub fn remove(dir: &Path, name: &str) -> std::io::Result<()> {
        match std::fs::remove_file(dir.join(name)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn map(file: &File) -> Result<MmapMut, StoreError> {
        // SAFETY: the mapping is private to this middleware's processes and
        // every access goes through the arena, which hands out disjoint
        // extents guarded by per-buffer locks.
        let map = unsafe { MmapMut::map_mut(file)? };
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(super) fn base_ptr(&mut self) -> *mut u8 {
        self.map.as_mut_ptr()
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        if self.owner {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), error = %e, "Failed to unlink segment");
                }
            }
        }
    }
}
