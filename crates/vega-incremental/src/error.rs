use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors produced by the incremental caches.
///
/// Every variant is fatal for the affected scope: the build orchestrator
/// responds by forcing a full rebuild rather than trusting a partial cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("storage error: {0}")]
    Storage(#[from] vega_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] vega_metadata::MetadataError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("counters file {path} is corrupt")]
    CorruptCounters { path: PathBuf },
}
