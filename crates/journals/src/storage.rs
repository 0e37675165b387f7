//! Persistent key to bytes store with a modification-time side channel.
//!
//! - `disk` - two files per key under a cache directory
//! - `memory` - process-local store for tests and ephemeral services
//! - `codec` - postcard + zstd encoding of cached values

mod codec;
mod disk;
mod memory;

use std::hash::Hasher;

use chrono::{DateTime, Utc};
use fnv::FnvHasher;

use crate::error::Result;
use crate::source::SourceKey;

pub use codec::{decode_compressed, encode_compressed};
pub use disk::DiskBlobStore;
pub use memory::MemoryBlobStore;

/// Deterministic cache key for `(source_key, data_name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(source: &SourceKey, data_name: &str) -> Self {
        let mut hasher = FnvHasher::default();
        hasher.write(source.as_str().as_bytes());
        hasher.write(&[0xff]);
        hasher.write(data_name.as_bytes());
        Self(format!("{:016x}", hasher.finish()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A stored value and the origin modification time recorded with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBlob {
    pub bytes: Vec<u8>,
    pub modified: Option<DateTime<Utc>>,
}

pub trait BlobStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<CachedBlob>>;

    /// Stores `bytes`, replacing any previous entry and its timestamp.
    fn put(&self, key: &CacheKey, bytes: &[u8], modified: Option<DateTime<Utc>>) -> Result<()>;

    fn remove(&self, key: &CacheKey) -> Result<()>;
}
