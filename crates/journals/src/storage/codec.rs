//! Compact encoding of cached values.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{JournalError, Result};

const ZSTD_LEVEL: i32 = 6;

/// Encodes a value with postcard and compresses it with zstd.
pub fn encode_compressed<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let encoded = postcard::to_stdvec(value).map_err(|error| {
        JournalError::Serialization(format!("failed to encode with postcard: {error}"))
    })?;
    zstd::encode_all(encoded.as_slice(), ZSTD_LEVEL).map_err(|error| {
        JournalError::Serialization(format!("failed to compress with zstd: {error}"))
    })
}

/// Reverses [`encode_compressed`].
pub fn decode_compressed<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let decompressed = zstd::decode_all(bytes).map_err(|error| {
        JournalError::Serialization(format!("failed to decompress with zstd: {error}"))
    })?;
    postcard::from_bytes(&decompressed).map_err(|error| {
        JournalError::Serialization(format!("failed to decode with postcard: {error}"))
    })
}
