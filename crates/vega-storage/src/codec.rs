use crate::error::{Result, StorageError};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Hard upper bound for any bincode-encoded payload read back from disk.
///
/// A corrupted length prefix must degrade to an invalidated map, not an
/// out-of-memory crash.
pub const PAYLOAD_LIMIT_BYTES: u64 = 64 * 1024 * 1024;

fn bincode_options() -> impl bincode::Options + Copy {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode_options().serialize(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8], path: &Path) -> Result<T> {
    if bytes.len() as u64 > PAYLOAD_LIMIT_BYTES {
        return Err(StorageError::OversizePayload {
            path: path.to_path_buf(),
        });
    }
    bincode_options()
        .with_limit(PAYLOAD_LIMIT_BYTES)
        .deserialize(bytes)
        .map_err(|_| StorageError::CorruptMap {
            path: path.to_path_buf(),
        })
}
