use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors produced by the persistent map layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("persistent map file {path} is corrupt")]
    CorruptMap { path: PathBuf },

    #[error("cache manifest {path} is corrupt")]
    CorruptManifest { path: PathBuf },

    #[error("cache directory {path} is locked by another build")]
    DirectoryLocked { path: PathBuf },

    #[error("persistent map payload in {path} exceeds the deserialization limit")]
    OversizePayload { path: PathBuf },
}
