//! On-disk blob store.
//!
//! Each key is persisted as two artifacts in the cache directory:
//! `<key>.blob` holds the content and `<key>.mtime` the origin
//! modification time. A missing `.mtime` means no known timestamp.
//! Both are written to a temp file first and renamed into place.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BlobStore, CacheKey, CachedBlob};
use crate::error::{JournalError, Result};

/// Format version of the `.mtime` artifact.
const MTIME_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoredModTime {
    version: u32,
    modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DiskBlobStore {
    root: PathBuf,
}

impl DiskBlobStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|error| {
            JournalError::Cache(format!(
                "failed to create cache directory {}: {error}",
                root.display()
            ))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.blob", key.as_str()))
    }

    fn mtime_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.mtime", key.as_str()))
    }

    fn read_modified(&self, key: &CacheKey) -> Option<DateTime<Utc>> {
        let path = self.mtime_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return None,
            Err(error) => {
                log::warn!("cache mtime read failed for {}: {}", path.display(), error);
                return None;
            }
        };
        match postcard::from_bytes::<StoredModTime>(&bytes) {
            Ok(stored) if stored.version == MTIME_VERSION => Some(stored.modified),
            Ok(stored) => {
                log::debug!(
                    "cache mtime version mismatch: {} != {}",
                    stored.version,
                    MTIME_VERSION
                );
                None
            }
            Err(error) => {
                log::warn!("cache mtime decode failed for {}: {}", path.display(), error);
                None
            }
        }
    }
}

impl BlobStore for DiskBlobStore {
    fn get(&self, key: &CacheKey) -> Result<Option<CachedBlob>> {
        let path = self.blob_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(JournalError::Cache(format!(
                    "failed to read {}: {error}",
                    path.display()
                )))
            }
        };
        Ok(Some(CachedBlob {
            bytes,
            modified: self.read_modified(key),
        }))
    }

    fn put(&self, key: &CacheKey, bytes: &[u8], modified: Option<DateTime<Utc>>) -> Result<()> {
        // New content must never pair with the previous mtime.
        remove_if_exists(&self.mtime_path(key))?;
        write_atomic(&self.blob_path(key), bytes)?;

        if let Some(modified) = modified {
            let encoded = postcard::to_stdvec(&StoredModTime {
                version: MTIME_VERSION,
                modified,
            })
            .map_err(|error| {
                JournalError::Serialization(format!("failed to encode cache mtime: {error}"))
            })?;
            write_atomic(&self.mtime_path(key), &encoded)?;
        }

        log::debug!(
            "wrote cache entry {} ({} bytes) to {}",
            key.as_str(),
            bytes.len(),
            self.root.display()
        );
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<()> {
        remove_if_exists(&self.mtime_path(key))?;
        remove_if_exists(&self.blob_path(key))
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let extension = path
        .extension()
        .map(|extension| extension.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp_path = path.with_extension(format!("{extension}.tmp"));
    {
        let mut output = File::create(&tmp_path).map_err(|error| {
            JournalError::Cache(format!(
                "failed to create cache file {}: {error}",
                tmp_path.display()
            ))
        })?;
        output.write_all(bytes).map_err(|error| {
            JournalError::Cache(format!(
                "failed to write cache file {}: {error}",
                tmp_path.display()
            ))
        })?;
    }
    fs::rename(&tmp_path, path).map_err(|error| {
        JournalError::Cache(format!(
            "failed to finalize cache file {}: {error}",
            path.display()
        ))
    })
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
        Err(error) => Err(JournalError::Cache(format!(
            "failed to remove {}: {error}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;
    use chrono::TimeZone;

    fn key(name: &str) -> CacheKey {
        CacheKey::new(&Source::archive("http://data.example", None).key(), name)
    }

    #[test]
    fn put_then_get_round_trips_bytes_and_time() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let store = DiskBlobStore::open(temp.path().join("cache")).expect("open");
        let modified = Utc.with_ymd_and_hms(2019, 3, 1, 12, 30, 5).unwrap();

        store
            .put(&key("journal_19_1.xml"), b"payload", Some(modified))
            .expect("put");
        let blob = store.get(&key("journal_19_1.xml")).expect("get").expect("present");
        assert_eq!(blob.bytes, b"payload");
        assert_eq!(blob.modified, Some(modified));
    }

    #[test]
    fn missing_entries_and_timestamps() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let store = DiskBlobStore::open(temp.path()).expect("open");
        assert!(store.get(&key("absent")).expect("get").is_none());

        let modified = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        store.put(&key("a"), b"one", Some(modified)).expect("put");
        store.put(&key("a"), b"two", None).expect("overwrite");
        let blob = store.get(&key("a")).expect("get").expect("present");
        assert_eq!(blob.bytes, b"two");
        assert_eq!(blob.modified, None);

        store.remove(&key("a")).expect("remove");
        assert!(store.get(&key("a")).expect("get").is_none());
        store.remove(&key("a")).expect("removing twice is fine");
    }
}
