//! In-memory blob store for tests and ephemeral caches.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::blob::{BlobKind, BlobStore, ListAll};
use crate::error::StoreResult;
use crate::key::CacheKey;

/// Blob store backed by a `HashMap`. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<(CacheKey, BlobKind), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs held, across all kinds.
    pub fn blob_count(&self) -> usize {
        self.blobs.read().len()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, key: &CacheKey, kind: BlobKind, bytes: &[u8]) -> StoreResult<()> {
        self.blobs.write().insert((key.clone(), kind), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &CacheKey, kind: BlobKind) -> Option<Vec<u8>> {
        self.blobs.read().get(&(key.clone(), kind)).cloned()
    }

    fn delete_kind(&self, key: &CacheKey, kind: BlobKind) -> StoreResult<()> {
        self.blobs.write().remove(&(key.clone(), kind));
        Ok(())
    }

    fn delete(&self, key: &CacheKey) -> StoreResult<()> {
        let mut blobs = self.blobs.write();
        for kind in BlobKind::ALL {
            blobs.remove(&(key.clone(), kind));
        }
        Ok(())
    }

    fn list_all(&self) -> ListAll<'_> {
        // Snapshot up front; the lock must not be held across iteration.
        let records: Vec<(CacheKey, Vec<u8>)> = self
            .blobs
            .read()
            .iter()
            .filter(|((_, kind), _)| *kind == BlobKind::Metadata)
            .map(|((key, _), bytes)| (key.clone(), bytes.clone()))
            .collect();
        Box::new(records.into_iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::derive_key;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryBlobStore::new();
        let key = derive_key("http://x/a.js");

        store.put(&key, BlobKind::Source, b"src").unwrap();
        store.put(&key, BlobKind::Metadata, b"{}").unwrap();

        assert_eq!(store.get(&key, BlobKind::Source).unwrap(), b"src");
        assert_eq!(store.list_all().count(), 1);

        store.delete(&key).unwrap();
        store.delete(&key).unwrap();
        assert_eq!(store.blob_count(), 0);
    }

    #[test]
    fn test_list_all_snapshot_allows_writes_while_iterating() {
        let store = MemoryBlobStore::new();
        for url in ["http://x/a.js", "http://x/b.js"] {
            store.put(&derive_key(url), BlobKind::Metadata, b"{}").unwrap();
        }

        for (key, _) in store.list_all() {
            store.delete(&key).unwrap();
        }
        assert_eq!(store.blob_count(), 0);
    }
}
