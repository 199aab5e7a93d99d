use crate::error::{CacheError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use vega_core::{FileId, LookupSymbolKey};
use vega_storage::{atomic_write, CacheDirectory, PersistentMap, WriteTransaction};

pub const LOOKUPS_SCHEMA_VERSION: u32 = 1;

const COUNTERS_FILE: &str = "counters";

/// When the opportunistic compaction in [`LookupStorage::get`] kicks in.
///
/// Compaction is an optimization: callers must never rely on it having run.
/// `force_gc` ignores these thresholds and always compacts fully.
#[derive(Clone, Copy, Debug)]
pub struct LookupGcPolicy {
    /// Only sets larger than this are considered.
    pub size_threshold: usize,
    /// Compact when the live fraction of a set drops below this ratio.
    pub min_live_ratio: f64,
}

impl Default for LookupGcPolicy {
    fn default() -> Self {
        // Measured against large real-world modules: sets below 10k ids are
        // cheap to scan, and rewriting a set that is still mostly live costs
        // more than the garbage it reclaims.
        Self {
            size_threshold: 10_000,
            min_live_ratio: 0.5,
        }
    }
}

/// Persistent map of `(name, scope)` → the files that looked that symbol up.
///
/// File paths are interned to [`FileId`]s through the bidirectional
/// `id_to_file`/`file_to_id` maps; the id high-water-mark survives restarts in
/// the plain-text `counters` file. Ids whose file mapping is gone are garbage:
/// tolerated on read, pruned opportunistically per [`LookupGcPolicy`], and
/// removed deterministically by [`LookupStorage::force_gc`].
///
/// Every public operation locks one storage-wide mutex; the surrounding
/// compiler daemon is multi-threaded even though any given module compiles in
/// one round at a time.
#[derive(Debug)]
pub struct LookupStorage {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    lookup_map: PersistentMap<LookupSymbolKey, BTreeSet<FileId>>,
    id_to_file: PersistentMap<FileId, PathBuf>,
    file_to_id: PersistentMap<PathBuf, FileId>,
    counters_path: PathBuf,
    size: u32,
    policy: LookupGcPolicy,
    /// Key snapshot taken at open when change tracking is enabled; the
    /// added/removed symbol sets are the net diff against it.
    keys_at_open: Option<BTreeSet<LookupSymbolKey>>,
}

impl LookupStorage {
    pub fn open(dir: &CacheDirectory, track_changes: bool) -> Result<Self> {
        Self::open_with_policy(dir, track_changes, LookupGcPolicy::default())
    }

    pub fn open_with_policy(
        dir: &CacheDirectory,
        track_changes: bool,
        policy: LookupGcPolicy,
    ) -> Result<Self> {
        let lookup_map: PersistentMap<LookupSymbolKey, BTreeSet<FileId>> =
            PersistentMap::open(dir.root(), "lookups", LOOKUPS_SCHEMA_VERSION)?;
        let id_to_file: PersistentMap<FileId, PathBuf> =
            PersistentMap::open(dir.root(), "id-to-file", LOOKUPS_SCHEMA_VERSION)?;
        let file_to_id: PersistentMap<PathBuf, FileId> =
            PersistentMap::open(dir.root(), "file-to-id", LOOKUPS_SCHEMA_VERSION)?;
        let counters_path = dir.root().join(COUNTERS_FILE);

        let size = match read_counters(&counters_path)? {
            Some(size) => size,
            // No counters file yet: derive the high-water-mark from the id
            // map so a partially populated cache stays usable.
            None => id_to_file
                .keys()
                .map(|id| id.as_u32() + 1)
                .max()
                .unwrap_or(0),
        };

        let keys_at_open =
            track_changes.then(|| lookup_map.keys().cloned().collect::<BTreeSet<_>>());

        Ok(Self {
            inner: Mutex::new(Inner {
                lookup_map,
                id_to_file,
                file_to_id,
                counters_path,
                size,
                policy,
                keys_at_open,
            }),
        })
    }

    /// All known files that looked up `symbol`.
    ///
    /// Dangling ids (files since removed) are filtered out; when a set is
    /// large and mostly garbage it is compacted in place as a side effect.
    pub fn get(&self, symbol: &LookupSymbolKey) -> Vec<PathBuf> {
        let mut inner = self.lock();
        let Some(ids) = inner.lookup_map.get(symbol) else {
            return Vec::new();
        };

        let total = ids.len();
        let live: BTreeSet<FileId> = ids
            .iter()
            .copied()
            .filter(|id| inner.id_to_file.contains_key(id))
            .collect();

        if total > inner.policy.size_threshold
            && (live.len() as f64) < (total as f64) * inner.policy.min_live_ratio
        {
            tracing::debug!(
                target = "vega.ic",
                scope = %symbol.scope,
                name = %symbol.name,
                total,
                live = live.len(),
                "compacting lookup set"
            );
            if live.is_empty() {
                inner.remove_key(symbol);
            } else {
                inner.lookup_map.set(symbol.clone(), live.clone());
            }
        }

        live.iter()
            .filter_map(|id| inner.id_to_file.get(id).cloned())
            .collect()
    }

    /// Append file ids to each symbol's id set.
    ///
    /// New paths get ids in lexicographic path order, so identical inputs
    /// produce identical ids across builds. Within a round this is a monotonic
    /// union: existing ids are never replaced.
    pub fn add_all(
        &self,
        lookups: &BTreeMap<LookupSymbolKey, BTreeSet<PathBuf>>,
        all_paths: &BTreeSet<PathBuf>,
    ) {
        let mut inner = self.lock();

        // BTreeSet iteration is already the deterministic lexicographic order.
        for path in all_paths {
            if !inner.file_to_id.contains_key(path) {
                let id = FileId::new(inner.size);
                inner.size += 1;
                inner.file_to_id.set(path.clone(), id);
                inner.id_to_file.set(id, path.clone());
            }
        }

        for (key, paths) in lookups {
            let ids: BTreeSet<FileId> = paths
                .iter()
                .filter_map(|path| inner.file_to_id.get(path).copied())
                .collect();
            debug_assert_eq!(ids.len(), paths.len(), "lookup paths missing from all_paths");
            if ids.is_empty() {
                continue;
            }
            inner.lookup_map.append(key.clone(), ids);
        }
    }

    /// Drop id mappings for `files` so their stale lookup associations die.
    ///
    /// The ids themselves stay in the lookup sets as garbage until GC; reads
    /// filter them out in the meantime.
    pub fn remove_lookups_from(&self, files: impl IntoIterator<Item = PathBuf>) {
        let mut inner = self.lock();
        for path in files {
            if let Some(id) = inner.file_to_id.remove(&path) {
                inner.id_to_file.remove(&id);
            }
        }
    }

    /// Lookup symbol keys present now but not when the storage was opened.
    ///
    /// Panics when change tracking is disabled.
    pub fn added_lookup_symbols(&self) -> BTreeSet<LookupSymbolKey> {
        let inner = self.lock();
        let at_open = inner
            .keys_at_open
            .as_ref()
            .expect("lookup symbol change tracking is disabled");
        inner
            .lookup_map
            .keys()
            .filter(|key| !at_open.contains(key))
            .cloned()
            .collect()
    }

    /// Lookup symbol keys present at open but gone now.
    ///
    /// Panics when change tracking is disabled.
    pub fn removed_lookup_symbols(&self) -> BTreeSet<LookupSymbolKey> {
        let inner = self.lock();
        let at_open = inner
            .keys_at_open
            .as_ref()
            .expect("lookup symbol change tracking is disabled");
        at_open
            .iter()
            .filter(|key| !inner.lookup_map.contains_key(key))
            .cloned()
            .collect()
    }

    /// Deterministic full compaction: drop every garbage id and renumber the
    /// id space densely by lexicographic path order. For tests and
    /// verification; a real build never needs it for correctness.
    pub fn force_gc(&self) {
        let mut inner = self.lock();

        // file_to_id iterates in lexicographic path order, which is exactly
        // the deterministic id assignment order.
        let mut remap: BTreeMap<FileId, FileId> = BTreeMap::new();
        let mut new_file_to_id: Vec<(PathBuf, FileId)> = Vec::new();
        for (index, (path, old_id)) in inner.file_to_id.iter().enumerate() {
            let new_id = FileId::new(index as u32);
            remap.insert(*old_id, new_id);
            new_file_to_id.push((path.clone(), new_id));
        }

        let keys: Vec<LookupSymbolKey> = inner.lookup_map.keys().cloned().collect();
        for key in keys {
            let Some(ids) = inner.lookup_map.get(&key) else {
                continue;
            };
            let remapped: BTreeSet<FileId> =
                ids.iter().filter_map(|id| remap.get(id).copied()).collect();
            if remapped.is_empty() {
                inner.remove_key(&key);
            } else {
                inner.lookup_map.set(key, remapped);
            }
        }

        let old_ids: Vec<FileId> = inner.id_to_file.keys().copied().collect();
        for id in old_ids {
            inner.id_to_file.remove(&id);
        }
        inner.size = new_file_to_id.len() as u32;
        for (path, id) in new_file_to_id {
            inner.id_to_file.set(id, path.clone());
            inner.file_to_id.set(path, id);
        }
        tracing::debug!(target = "vega.ic", live = inner.size, "lookup storage force_gc");
    }

    /// Human-readable dump in deterministic `(scope, name)` order.
    pub fn dump(&self) -> String {
        let inner = self.lock();
        let mut out = String::new();
        for (key, ids) in inner.lookup_map.iter() {
            let mut paths: Vec<String> = ids
                .iter()
                .filter_map(|id| inner.id_to_file.get(id))
                .map(|path| path.display().to_string())
                .collect();
            paths.sort();
            out.push_str(&format!(
                "{}#{} -> [{}]\n",
                key.scope,
                key.name,
                paths.join(", ")
            ));
        }
        out
    }

    /// Persist maps and the counters file. With `memory_only` nothing touches
    /// disk; the in-memory state stays authoritative for a later real flush.
    pub fn flush(&self, memory_only: bool) -> Result<()> {
        let mut inner = self.lock();
        if memory_only {
            return Ok(());
        }
        inner.lookup_map.flush(false)?;
        inner.id_to_file.flush(false)?;
        inner.file_to_id.flush(false)?;
        atomic_write(&inner.counters_path, counters_bytes(inner.size).as_bytes())?;
        Ok(())
    }

    /// Stage this storage's writes into `txn`; call
    /// [`LookupStorage::mark_committed`] once the transaction commits.
    pub fn stage(&self, txn: &mut WriteTransaction) -> Result<()> {
        let inner = self.lock();
        inner.lookup_map.stage(txn)?;
        inner.id_to_file.stage(txn)?;
        inner.file_to_id.stage(txn)?;
        txn.stage(
            inner.counters_path.clone(),
            counters_bytes(inner.size).into_bytes(),
        );
        Ok(())
    }

    pub fn mark_committed(&self) {
        let mut inner = self.lock();
        inner.lookup_map.mark_clean();
        inner.id_to_file.mark_clean();
        inner.file_to_id.mark_clean();
    }

    /// Drop all data, in memory and on disk.
    pub fn clean(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.lookup_map.clean()?;
        inner.id_to_file.clean()?;
        inner.file_to_id.clean()?;
        match std::fs::remove_file(&inner.counters_path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        inner.size = 0;
        if let Some(at_open) = inner.keys_at_open.as_mut() {
            at_open.clear();
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Inner {
    fn remove_key(&mut self, key: &LookupSymbolKey) {
        self.lookup_map.remove(key);
    }
}

fn counters_bytes(size: u32) -> String {
    // Second slot is a historical field, always zero.
    format!("{size}\n0")
}

fn read_counters(path: &Path) -> Result<Option<u32>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let first_line = text.lines().next().unwrap_or_default();
    first_line
        .trim()
        .parse::<u32>()
        .map(Some)
        .map_err(|_| CacheError::CorruptCounters {
            path: path.to_path_buf(),
        })
}
