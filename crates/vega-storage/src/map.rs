use crate::codec;
use crate::error::{Result, StorageError};
use crate::txn::WriteTransaction;
use crate::write::atomic_write;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

/// Magic number at the front of every persistent map file.
const MAP_MAGIC: u32 = 0x5645_4741;

#[derive(Serialize, Deserialize)]
struct PersistedMapFile<K: Ord, V> {
    magic: u32,
    schema_version: u32,
    entries: BTreeMap<K, V>,
}

#[derive(Serialize)]
struct PersistedMapFileRef<'a, K: Ord, V> {
    magic: u32,
    schema_version: u32,
    entries: &'a BTreeMap<K, V>,
}

/// A named, typed map persisted as one file inside a cache directory.
///
/// All reads and writes go through an in-memory `BTreeMap`; `flush` encodes
/// the whole map and atomically replaces the file. Key and value codecs are
/// their serde implementations, composed through bincode rather than through
/// a subclass-per-value-type hierarchy.
///
/// A file whose schema version doesn't match `schema_version` is cleaned on
/// open (full invalidation of that map). A file that is present but
/// undecodable is an error: the owning cache must surface it so the build can
/// fall back to a full rebuild instead of trusting a corrupt cache.
#[derive(Debug)]
pub struct PersistentMap<K, V> {
    name: String,
    path: PathBuf,
    schema_version: u32,
    data: BTreeMap<K, V>,
    dirty: bool,
}

impl<K, V> PersistentMap<K, V>
where
    K: Ord + Clone + Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    /// Open (or create empty) the map file `<name>.tab` under `dir`.
    pub fn open(dir: &Path, name: &str, schema_version: u32) -> Result<Self> {
        let path = dir.join(format!("{name}.tab"));
        let data = match std::fs::read(&path) {
            Ok(bytes) => {
                let file: PersistedMapFile<K, V> = codec::decode(&bytes, &path)?;
                if file.magic != MAP_MAGIC {
                    return Err(StorageError::CorruptMap { path });
                }
                if file.schema_version != schema_version {
                    tracing::debug!(
                        target = "vega.storage",
                        map = name,
                        expected = schema_version,
                        found = file.schema_version,
                        "schema version mismatch; cleaning persistent map"
                    );
                    remove_file_if_exists(&path)?;
                    BTreeMap::new()
                } else {
                    file.entries
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            name: name.to_string(),
            path,
            schema_version,
            data,
            dirty: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.data.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.data.contains_key(key)
    }

    pub fn set(&mut self, key: K, value: V) {
        self.data.insert(key, value);
        self.dirty = true;
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.data.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.data.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.data.iter()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drop all data, in memory and on disk.
    pub fn clean(&mut self) -> Result<()> {
        self.data.clear();
        self.dirty = false;
        remove_file_if_exists(&self.path)
    }

    /// Persist the in-memory state.
    ///
    /// With `memory_only` the disk write is skipped and the in-memory state
    /// stays authoritative (the map remains dirty), so a build can defer its
    /// side effects until the round is confirmed successful.
    pub fn flush(&mut self, memory_only: bool) -> Result<()> {
        if !self.dirty || memory_only {
            return Ok(());
        }
        atomic_write(&self.path, &self.encoded()?)?;
        self.dirty = false;
        Ok(())
    }

    /// Stage this map's bytes into `txn` instead of writing directly.
    ///
    /// Call [`PersistentMap::mark_clean`] only after the transaction commits.
    pub fn stage(&self, txn: &mut WriteTransaction) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        txn.stage(self.path.clone(), self.encoded()?);
        Ok(())
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    fn encoded(&self) -> Result<Vec<u8>> {
        codec::encode(&PersistedMapFileRef {
            magic: MAP_MAGIC,
            schema_version: self.schema_version,
            entries: &self.data,
        })
    }
}

impl<K, V> PersistentMap<K, BTreeSet<V>>
where
    K: Ord + Clone + Serialize + DeserializeOwned,
    V: Ord + Serialize + DeserializeOwned,
{
    /// Union `values` into the set stored under `key` (append semantics).
    pub fn append(&mut self, key: K, values: impl IntoIterator<Item = V>) {
        let set = self.data.entry(key).or_default();
        for value in values {
            set.insert(value);
        }
        self.dirty = true;
    }

    /// Remove `values` from the set under `key`, dropping the entry if it
    /// becomes empty.
    pub fn remove_values(&mut self, key: &K, values: &BTreeSet<V>) {
        let Some(set) = self.data.get_mut(key) else {
            return;
        };
        for value in values {
            set.remove(value);
        }
        if set.is_empty() {
            self.data.remove(key);
        }
        self.dirty = true;
    }
}

fn remove_file_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
