use crate::error::{Result, StorageError};
use crate::write::atomic_write;
use fs2::FileExt as _;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Bump whenever the manifest layout itself changes.
pub const CACHE_MANIFEST_VERSION: u32 = 1;

/// Bump whenever the interpretation of any map file changes incompatibly.
pub const STORAGE_SCHEMA_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const LOCK_FILE: &str = ".lock";

#[derive(Debug, Serialize, Deserialize)]
struct CacheManifest {
    manifest_version: u32,
    storage_schema_version: u32,
    vega_version: String,
}

impl CacheManifest {
    fn current() -> Self {
        Self {
            manifest_version: CACHE_MANIFEST_VERSION,
            storage_schema_version: STORAGE_SCHEMA_VERSION,
            vega_version: vega_core::VEGA_VERSION.to_string(),
        }
    }

    fn is_compatible(&self) -> bool {
        self.manifest_version == CACHE_MANIFEST_VERSION
            && self.storage_schema_version == STORAGE_SCHEMA_VERSION
            && self.vega_version == vega_core::VEGA_VERSION
    }
}

/// Exclusive hold on a directory's lockfile, released when the handle
/// closes.
///
/// The lock lives on the open file handle, so it excludes other processes
/// and other handles in this process alike. Contention is a fail-fast typed
/// error rather than a blocking wait: two builds fighting over one module
/// cache is an orchestrator bug, and blocking would just deadlock it.
#[derive(Debug)]
struct DirectoryLock {
    _file: File,
}

impl DirectoryLock {
    fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { _file: file }),
            Err(err)
                if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
            {
                Err(StorageError::DirectoryLocked {
                    path: path.to_path_buf(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// A per-module cache directory: the map files, a human-readable version
/// manifest, and an exclusive lock.
///
/// Opening a directory written by an incompatible Vega version cleans it and
/// starts fresh (a full invalidation of that module's caches). A manifest
/// that is present but unparseable is an error, not a silent miss: a corrupt
/// cache must trigger a full rebuild decision upstream, never be half-used.
#[derive(Debug)]
pub struct CacheDirectory {
    root: PathBuf,
    _lock: DirectoryLock,
}

impl CacheDirectory {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let lock = DirectoryLock::acquire(&root.join(LOCK_FILE))?;
        let dir = Self { root, _lock: lock };

        match dir.read_manifest()? {
            Some(manifest) if manifest.is_compatible() => {}
            Some(manifest) => {
                tracing::debug!(
                    target = "vega.storage",
                    root = %dir.root.display(),
                    found_schema = manifest.storage_schema_version,
                    found_version = %manifest.vega_version,
                    "incompatible cache directory; cleaning"
                );
                dir.clean()?;
                dir.write_manifest()?;
            }
            None => dir.write_manifest()?,
        }

        Ok(dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Delete every map file in the directory (the lockfile and manifest
    /// survive).
    pub fn clean(&self) -> Result<()> {
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name();
            if name == LOCK_FILE || name == MANIFEST_FILE {
                continue;
            }
            if entry.file_type()?.is_file() {
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }
        Ok(())
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    fn read_manifest(&self) -> Result<Option<CacheManifest>> {
        let bytes = match std::fs::read(self.manifest_path()) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|_| StorageError::CorruptManifest {
                path: self.manifest_path(),
            })
    }

    fn write_manifest(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&CacheManifest::current())?;
        atomic_write(&self.manifest_path(), &bytes)
    }
}
