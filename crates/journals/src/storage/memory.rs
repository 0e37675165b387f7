use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use parking_lot::RwLock;

use super::{BlobStore, CacheKey, CachedBlob};
use crate::error::Result;

/// A process-local blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    entries: RwLock<FnvHashMap<CacheKey, CachedBlob>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &CacheKey) -> Result<Option<CachedBlob>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &CacheKey, bytes: &[u8], modified: Option<DateTime<Utc>>) -> Result<()> {
        self.entries.write().insert(
            key.clone(),
            CachedBlob {
                bytes: bytes.to_vec(),
                modified,
            },
        );
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}
