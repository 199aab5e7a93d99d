use super::cache_dir;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use vega_core::LookupSymbolKey;
use vega_incremental::{CacheError, LookupStorage};
use vega_storage::WriteTransaction;

fn path(name: &str) -> PathBuf {
    PathBuf::from(name)
}

fn add(storage: &LookupStorage, name: &str, scope: &str, files: &[&str]) {
    let key = LookupSymbolKey::new(name, scope);
    let paths: BTreeSet<PathBuf> = files.iter().copied().map(path).collect();
    let lookups = BTreeMap::from([(key, paths.clone())]);
    storage.add_all(&lookups, &paths);
}

#[test]
fn round_trip() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "lookups");
    let storage = LookupStorage::open(&dir, false).unwrap();

    add(&storage, "foo", "com.example.A", &["f1.vg", "f2.vg"]);

    let files: BTreeSet<PathBuf> = storage
        .get(&LookupSymbolKey::new("foo", "com.example.A"))
        .into_iter()
        .collect();
    assert_eq!(files, BTreeSet::from([path("f1.vg"), path("f2.vg")]));
}

#[test]
fn unknown_symbol_resolves_to_empty() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "lookups");
    let storage = LookupStorage::open(&dir, false).unwrap();

    assert!(storage.get(&LookupSymbolKey::new("never", "Seen")).is_empty());
}

#[test]
fn add_all_is_a_monotonic_union() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "lookups");
    let storage = LookupStorage::open(&dir, false).unwrap();

    add(&storage, "foo", "A", &["f1.vg"]);
    add(&storage, "foo", "A", &["f2.vg"]);

    let files: BTreeSet<PathBuf> = storage
        .get(&LookupSymbolKey::new("foo", "A"))
        .into_iter()
        .collect();
    assert_eq!(files, BTreeSet::from([path("f1.vg"), path("f2.vg")]));
}

#[test]
fn removed_files_stop_resolving() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "lookups");
    let storage = LookupStorage::open(&dir, false).unwrap();

    add(&storage, "foo", "A", &["f1.vg", "f2.vg"]);
    storage.remove_lookups_from([path("f1.vg")]);

    assert_eq!(
        storage.get(&LookupSymbolKey::new("foo", "A")),
        vec![path("f2.vg")]
    );
}

#[test]
fn force_gc_preserves_live_data() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "lookups");
    let storage = LookupStorage::open(&dir, false).unwrap();

    add(&storage, "foo", "A", &["f1.vg", "f2.vg", "f3.vg"]);
    storage.remove_lookups_from([path("f2.vg")]);

    let before: BTreeSet<PathBuf> = storage
        .get(&LookupSymbolKey::new("foo", "A"))
        .into_iter()
        .collect();
    storage.force_gc();
    let after: BTreeSet<PathBuf> = storage
        .get(&LookupSymbolKey::new("foo", "A"))
        .into_iter()
        .collect();

    assert_eq!(before, after);
    assert_eq!(after, BTreeSet::from([path("f1.vg"), path("f3.vg")]));
}

#[test]
fn reads_stay_correct_when_opportunistic_compaction_triggers() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "lookups");
    let policy = vega_incremental::LookupGcPolicy {
        size_threshold: 2,
        min_live_ratio: 0.9,
    };
    let storage = LookupStorage::open_with_policy(&dir, false, policy).unwrap();

    add(&storage, "foo", "A", &["f1.vg", "f2.vg", "f3.vg", "f4.vg"]);
    storage.remove_lookups_from([path("f2.vg"), path("f3.vg"), path("f4.vg")]);

    // The set is over the threshold and mostly garbage, so this read compacts
    // it as a side effect and must still return exactly the live files.
    for _ in 0..2 {
        assert_eq!(
            storage.get(&LookupSymbolKey::new("foo", "A")),
            vec![path("f1.vg")]
        );
    }
}

#[test]
fn dump_is_deterministic_and_garbage_free_after_gc() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "lookups");
    let storage = LookupStorage::open(&dir, false).unwrap();

    add(&storage, "b", "ScopeB", &["f2.vg"]);
    add(&storage, "a", "ScopeA", &["f1.vg"]);
    storage.remove_lookups_from([path("f2.vg")]);
    storage.force_gc();

    assert_eq!(storage.dump(), "ScopeA#a -> [f1.vg]\n");
}

#[test]
fn ids_and_counters_survive_reopen() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "lookups");

    let storage = LookupStorage::open(&dir, false).unwrap();
    add(&storage, "foo", "A", &["f1.vg", "f2.vg"]);
    storage.flush(false).unwrap();
    drop(storage);

    let counters = std::fs::read_to_string(dir.root().join("counters")).unwrap();
    assert_eq!(counters, "2\n0");

    let storage = LookupStorage::open(&dir, false).unwrap();
    let files: BTreeSet<PathBuf> = storage
        .get(&LookupSymbolKey::new("foo", "A"))
        .into_iter()
        .collect();
    assert_eq!(files, BTreeSet::from([path("f1.vg"), path("f2.vg")]));

    // New paths keep getting fresh ids above the persisted high-water-mark.
    add(&storage, "bar", "A", &["f3.vg"]);
    storage.flush(false).unwrap();
    let counters = std::fs::read_to_string(dir.root().join("counters")).unwrap();
    assert_eq!(counters, "3\n0");
}

#[test]
fn missing_counters_file_derives_high_water_mark_from_id_map() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "lookups");

    let storage = LookupStorage::open(&dir, false).unwrap();
    add(&storage, "foo", "A", &["f1.vg", "f2.vg"]);
    storage.flush(false).unwrap();
    drop(storage);
    std::fs::remove_file(dir.root().join("counters")).unwrap();

    // Reopening without counters must not hand out ids below the ones the
    // persisted id map already uses.
    let storage = LookupStorage::open(&dir, false).unwrap();
    add(&storage, "bar", "A", &["f3.vg"]);
    storage.flush(false).unwrap();

    let counters = std::fs::read_to_string(dir.root().join("counters")).unwrap();
    assert_eq!(counters, "3\n0");
    let files: BTreeSet<PathBuf> = storage
        .get(&LookupSymbolKey::new("foo", "A"))
        .into_iter()
        .collect();
    assert_eq!(files, BTreeSet::from([path("f1.vg"), path("f2.vg")]));
}

#[test]
fn corrupt_counters_file_is_fatal_at_open() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "lookups");
    std::fs::write(dir.root().join("counters"), "not a number\n0").unwrap();

    let err = LookupStorage::open(&dir, false).unwrap_err();
    match err {
        CacheError::CorruptCounters { .. } => {}
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn change_tracking_reports_net_added_and_removed_keys() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "lookups");

    let storage = LookupStorage::open(&dir, false).unwrap();
    add(&storage, "old", "A", &["f1.vg"]);
    storage.flush(false).unwrap();
    drop(storage);

    let storage = LookupStorage::open(&dir, true).unwrap();
    add(&storage, "new", "A", &["f2.vg"]);
    // Dropping the only file of `old#A` and compacting removes the key.
    storage.remove_lookups_from([path("f1.vg")]);
    storage.force_gc();

    assert_eq!(
        storage.added_lookup_symbols(),
        BTreeSet::from([LookupSymbolKey::new("new", "A")])
    );
    assert_eq!(
        storage.removed_lookup_symbols(),
        BTreeSet::from([LookupSymbolKey::new("old", "A")])
    );
}

#[test]
#[should_panic(expected = "change tracking is disabled")]
fn change_tracking_access_panics_when_disabled() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "lookups");
    let storage = LookupStorage::open(&dir, false).unwrap();
    storage.added_lookup_symbols();
}

#[test]
fn staged_writes_only_land_on_commit() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "lookups");
    let storage = LookupStorage::open(&dir, false).unwrap();
    add(&storage, "foo", "A", &["f1.vg"]);

    let mut txn = WriteTransaction::new();
    storage.stage(&mut txn).unwrap();
    txn.rollback();
    assert!(!dir.root().join("lookups.tab").exists());

    let mut txn = WriteTransaction::new();
    storage.stage(&mut txn).unwrap();
    txn.commit().unwrap();
    storage.mark_committed();
    assert!(dir.root().join("lookups.tab").exists());
}

#[test]
fn clean_drops_memory_and_disk() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "lookups");
    let storage = LookupStorage::open(&dir, false).unwrap();

    add(&storage, "foo", "A", &["f1.vg"]);
    storage.flush(false).unwrap();
    storage.clean().unwrap();

    assert!(storage.get(&LookupSymbolKey::new("foo", "A")).is_empty());
    assert!(!dir.root().join("lookups.tab").exists());
    assert!(!dir.root().join("counters").exists());
}
