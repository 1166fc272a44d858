//! Shared buffer store
//!
//! Hosts the byte regions and the two key→buffer maps. Each map has its own
//! reader/writer lock guarding structure only; every buffer carries its own
//! content lock. Map locks are never held across a content-lock acquisition:
//! lookups clone the `Arc` and release the map before touching bytes.

use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;

use super::arena::Arena;
use super::buffer::{LocalBuffer, RemoteBuffer};
use super::error::StoreError;
use super::key::{LocalKey, RemoteKey};
use super::segment::Segment;

/// Byte store and buffer maps for one server instance
pub struct BufferStore {
    arena: Arena,
    local: RwLock<HashMap<LocalKey, Arc<LocalBuffer>>>,
    remote: RwLock<HashMap<RemoteKey, Arc<RemoteBuffer>>>,
}

impl BufferStore {
    pub fn new(segment: Segment) -> Self {
        Self {
            arena: Arena::new(segment),
            local: RwLock::new(HashMap::new()),
            remote: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate a local buffer; the region is zeroed
    pub async fn allocate_local(
        &self,
        key: LocalKey,
        len: u16,
        multicast: SocketAddrV4,
    ) -> Result<Arc<LocalBuffer>, StoreError> {
        let mut local = self.local.write().await;
        if local.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        let handle = self.arena.allocate(len as usize)?;
        self.arena.write(handle, &vec![0u8; len as usize]);
        let buffer = Arc::new(LocalBuffer::new(handle, len, multicast));
        local.insert(key, Arc::clone(&buffer));
        Ok(buffer)
    }

    /// Allocate a remote replica; the region is zeroed and starts inactive
    pub async fn allocate_remote(
        &self,
        key: RemoteKey,
        len: u16,
    ) -> Result<Arc<RemoteBuffer>, StoreError> {
        let mut remote = self.remote.write().await;
        if remote.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        let handle = self.arena.allocate(len as usize)?;
        self.arena.write(handle, &vec![0u8; len as usize]);
        let buffer = Arc::new(RemoteBuffer::new(handle, len));
        remote.insert(key, Arc::clone(&buffer));
        Ok(buffer)
    }

    /// Release a local buffer's region and erase it; no-op when absent
    pub async fn free_local(&self, key: &LocalKey) {
        let mut local = self.local.write().await;
        if let Some(buffer) = local.remove(key) {
            self.arena.free(buffer.handle);
        }
    }

    /// Release a remote buffer's region and erase it; no-op when absent
    pub async fn free_remote(&self, key: &RemoteKey) {
        let mut remote = self.remote.write().await;
        if let Some(buffer) = remote.remove(key) {
            self.arena.free(buffer.handle);
        }
    }

    pub async fn find_local(&self, key: &LocalKey) -> Option<Arc<LocalBuffer>> {
        self.local.read().await.get(key).cloned()
    }

    pub async fn find_remote(&self, key: &RemoteKey) -> Option<Arc<RemoteBuffer>> {
        self.remote.read().await.get(key).cloned()
    }

    /// Snapshot of the local map, for the sender's streaming pass
    pub(crate) async fn local_buffers(&self) -> Vec<(LocalKey, Arc<LocalBuffer>)> {
        self.local
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect()
    }

    pub async fn local_count(&self) -> usize {
        self.local.read().await.len()
    }

    pub async fn remote_count(&self) -> usize {
        self.remote.read().await.len()
    }

    /// Read a local buffer's contents under its shared content lock
    pub async fn read_local(&self, key: &LocalKey) -> Result<Bytes, StoreError> {
        let buffer = self
            .find_local(key)
            .await
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(self.read_region(&buffer.lock, buffer.handle).await)
    }

    /// Overwrite a local buffer under its exclusive content lock
    ///
    /// `data` is truncated or zero-padded to the registered length.
    pub async fn write_local(&self, key: &LocalKey, data: &[u8]) -> Result<(), StoreError> {
        let buffer = self
            .find_local(key)
            .await
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        self.write_region(&buffer.lock, buffer.handle, data).await;
        Ok(())
    }

    /// Read a remote replica's contents under its shared content lock
    pub async fn read_remote(&self, key: &RemoteKey) -> Result<Bytes, StoreError> {
        let buffer = self
            .find_remote(key)
            .await
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(self.read_region(&buffer.lock, buffer.handle).await)
    }

    /// Overwrite a remote replica; used by the replica receive task
    pub(crate) async fn write_remote(&self, key: &RemoteKey, data: &[u8]) -> Result<(), StoreError> {
        let buffer = self
            .find_remote(key)
            .await
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        self.write_region(&buffer.lock, buffer.handle, data).await;
        Ok(())
    }

    /// Read an already-resolved local buffer; used by the sender's data pass
    pub(crate) async fn read_local_buffer(&self, buffer: &LocalBuffer) -> Bytes {
        self.read_region(&buffer.lock, buffer.handle).await
    }

    async fn read_region(
        &self,
        lock: &tokio::sync::RwLock<()>,
        handle: super::arena::RegionHandle,
    ) -> Bytes {
        let mut out = vec![0u8; handle.len()];
        let _guard = lock.read().await;
        self.arena.read(handle, &mut out);
        Bytes::from(out)
    }

    async fn write_region(
        &self,
        lock: &tokio::sync::RwLock<()>,
        handle: super::arena::RegionHandle,
        data: &[u8],
    ) {
        let mut frame = vec![0u8; handle.len()];
        let n = data.len().min(handle.len());
        frame[..n].copy_from_slice(&data[..n]);
        let _guard = lock.write().await;
        self.arena.write(handle, &frame);
    }

    /// Bytes still available in the arena
    pub fn free_bytes(&self) -> usize {
        self.arena.free_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn store() -> (tempfile::TempDir, BufferStore) {
        let dir = tempfile::tempdir().unwrap();
        let segment = Segment::create(dir.path(), "store_test", 8192).unwrap();
        (dir, BufferStore::new(segment))
    }

    fn mcast(port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(239, 255, 0, 1), port)
    }

    #[tokio::test]
    async fn test_write_read_round_trip() {
        let (_dir, store) = store();
        let key = LocalKey::new("temp");
        store
            .allocate_local(key.clone(), 16, mcast(30000))
            .await
            .unwrap();

        store.write_local(&key, b"hello").await.unwrap();
        let contents = store.read_local(&key).await.unwrap();

        // padded to the registered length
        assert_eq!(contents.len(), 16);
        assert_eq!(&contents[..5], b"hello");
        assert!(contents[5..].iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn test_write_truncates_to_length() {
        let (_dir, store) = store();
        let key = LocalKey::new("small");
        store
            .allocate_local(key.clone(), 4, mcast(30001))
            .await
            .unwrap();

        store.write_local(&key, b"overflowing").await.unwrap();
        let contents = store.read_local(&key).await.unwrap();
        assert_eq!(&contents[..], b"over");
    }

    #[tokio::test]
    async fn test_double_allocate_rejected() {
        let (_dir, store) = store();
        let key = LocalKey::new("dup");
        store
            .allocate_local(key.clone(), 8, mcast(30002))
            .await
            .unwrap();
        assert!(matches!(
            store.allocate_local(key, 8, mcast(30003)).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_free_is_idempotent() {
        let (_dir, store) = store();
        let key = LocalKey::new("gone");
        store
            .allocate_local(key.clone(), 8, mcast(30004))
            .await
            .unwrap();

        let before = store.free_bytes();
        store.free_local(&key).await;
        assert_eq!(store.free_bytes(), before + 8);
        // absent key is a no-op, not an error
        store.free_local(&key).await;
        assert_eq!(store.free_bytes(), before + 8);
        assert!(store.find_local(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_arena_exhaustion_creates_nothing() {
        let (_dir, store) = store();
        // 8192-byte arena cannot hold nine 1024-byte buffers
        for i in 0..8 {
            store
                .allocate_local(LocalKey::new(format!("b{}", i)), 1024, mcast(30010 + i))
                .await
                .unwrap();
        }
        let key = LocalKey::new("b8");
        assert!(matches!(
            store.allocate_local(key.clone(), 1024, mcast(30020)).await,
            Err(StoreError::OutOfMemory { .. })
        ));
        assert!(store.find_local(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_remote_starts_inactive() {
        let (_dir, store) = store();
        let key = RemoteKey::new(
            "replica",
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 8888),
        );
        let buffer = store.allocate_remote(key.clone(), 32).await.unwrap();
        assert!(!buffer.is_active());

        store.write_remote(&key, &[7u8; 32]).await.unwrap();
        assert_eq!(&store.read_remote(&key).await.unwrap()[..], &[7u8; 32]);
    }
}
