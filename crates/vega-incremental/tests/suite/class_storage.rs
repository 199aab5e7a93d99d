use super::{cache_dir, class, sealed_class, src};
use std::collections::{BTreeMap, BTreeSet};
use vega_core::FqName;
use vega_incremental::{
    ChangeInfo, ChangesCollector, CompilationContext, IncrementalClassCache,
};
use vega_metadata::ProtoData;

fn save(cache: &mut IncrementalClassCache, proto: &ProtoData, source: &str) {
    let mut collector = ChangesCollector::new();
    let source = src(source);
    cache
        .save_class(proto, Some(source.as_path()), &mut collector)
        .unwrap();
}

fn assert_adjacency_symmetric(cache: &IncrementalClassCache, classes: &[&str]) {
    for parent in classes {
        let parent = FqName::new(*parent);
        let children = cache.direct_subtypes(&parent).cloned().unwrap_or_default();
        for child in &children {
            let parents = cache.direct_supertypes(child).cloned().unwrap_or_default();
            assert!(
                parents.contains(&parent),
                "subtypes[{parent}] contains {child} but supertypes[{child}] misses {parent}"
            );
        }
    }
    for child in classes {
        let child = FqName::new(*child);
        let parents = cache.direct_supertypes(&child).cloned().unwrap_or_default();
        for parent in &parents {
            let children = cache.direct_subtypes(parent).cloned().unwrap_or_default();
            assert!(
                children.contains(&child),
                "supertypes[{child}] contains {parent} but subtypes[{parent}] misses {child}"
            );
        }
    }
}

#[test]
fn universal_root_supertype_is_never_recorded() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "module");
    let mut cache = IncrementalClassCache::open(&dir).unwrap();

    save(&mut cache, &class("Foo", &["kotlin.Any", "Base"]), "Foo.vg");

    assert_eq!(
        cache.direct_supertypes(&FqName::new("Foo")),
        Some(&BTreeSet::from([FqName::new("Base")]))
    );
    assert!(cache.direct_subtypes(&FqName::new("kotlin.Any")).is_none());
}

#[test]
fn re_adding_identical_class_is_a_no_op() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "module");
    let mut cache = IncrementalClassCache::open(&dir).unwrap();

    let proto = class("Mid", &["Base"]);
    save(&mut cache, &proto, "Mid.vg");
    let subtypes_before = cache.direct_subtypes(&FqName::new("Base")).cloned();
    save(&mut cache, &proto, "Mid.vg");

    assert_eq!(cache.direct_subtypes(&FqName::new("Base")).cloned(), subtypes_before);
    assert_adjacency_symmetric(&cache, &["Base", "Mid"]);
}

#[test]
fn supertype_change_applies_exactly_the_delta() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "module");
    let mut cache = IncrementalClassCache::open(&dir).unwrap();

    save(&mut cache, &class("Other", &["Kept"]), "Other.vg");
    save(&mut cache, &class("Foo", &["Kept", "Dropped"]), "Foo.vg");
    save(&mut cache, &class("Foo", &["Kept", "Added"]), "Foo.vg");

    assert_eq!(
        cache.direct_supertypes(&FqName::new("Foo")),
        Some(&BTreeSet::from([FqName::new("Kept"), FqName::new("Added")]))
    );
    // The unrelated child of `Kept` is untouched by Foo's delta.
    assert_eq!(
        cache.direct_subtypes(&FqName::new("Kept")),
        Some(&BTreeSet::from([FqName::new("Foo"), FqName::new("Other")]))
    );
    assert!(cache.direct_subtypes(&FqName::new("Dropped")).is_none());
    assert_adjacency_symmetric(&cache, &["Kept", "Added", "Dropped", "Foo", "Other"]);
}

#[test]
fn removal_records_subclasses_before_stripping_adjacency() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "module");
    let mut context = CompilationContext::new();
    let id = context.add_module(IncrementalClassCache::open(&dir).unwrap());

    save(context.cache_mut(id), &class("Base", &[]), "Base.vg");
    save(context.cache_mut(id), &class("Mid", &["Base"]), "Mid.vg");
    save(context.cache_mut(id), &class("Leaf", &["Mid"]), "Leaf.vg");

    let mut collector = ChangesCollector::new();
    let removed = BTreeSet::from([FqName::new("Base")]);
    context.remove_classes(id, &removed, &mut collector).unwrap();

    // Subclasses were recorded from the pre-removal closure as
    // non-cascading signature changes.
    let signature_changed: BTreeSet<FqName> = collector
        .changes()
        .iter()
        .filter_map(|change| match change {
            ChangeInfo::SignatureChanged {
                fq_name,
                are_subclasses_affected: false,
            } => Some(fq_name.clone()),
            _ => None,
        })
        .collect();
    assert!(signature_changed.contains(&FqName::new("Mid")));
    assert!(signature_changed.contains(&FqName::new("Leaf")));

    let cache = context.cache(id);
    assert!(cache.direct_subtypes(&FqName::new("Base")).is_none());
    assert_eq!(
        cache.direct_supertypes(&FqName::new("Mid")),
        None,
        "Mid's link to the removed Base must be gone"
    );
    assert!(cache.source_file(&FqName::new("Base")).is_none());
    assert_adjacency_symmetric(cache, &["Base", "Mid", "Leaf"]);
}

#[test]
fn removal_strips_adjacency_in_dependent_caches_too() {
    let tmp = tempfile::TempDir::new().unwrap();
    let lib_dir = cache_dir(&tmp, "lib");
    let app_dir = cache_dir(&tmp, "app");

    let mut context = CompilationContext::new();
    let lib = context.add_module(IncrementalClassCache::open(&lib_dir).unwrap());
    let app = context.add_module(IncrementalClassCache::open(&app_dir).unwrap());
    context.set_dependents(lib, vec![app]);

    save(context.cache_mut(lib), &class("lib.Base", &[]), "Base.vg");
    save(
        context.cache_mut(app),
        &class("app.Impl", &["lib.Base"]),
        "Impl.vg",
    );

    let mut collector = ChangesCollector::new();
    let removed = BTreeSet::from([FqName::new("lib.Base")]);
    context.remove_classes(lib, &removed, &mut collector).unwrap();

    let signature_changed: BTreeSet<FqName> = collector
        .changes()
        .iter()
        .filter_map(|change| match change {
            ChangeInfo::SignatureChanged { fq_name, .. } => Some(fq_name.clone()),
            _ => None,
        })
        .collect();
    assert!(signature_changed.contains(&FqName::new("app.Impl")));

    assert!(context
        .cache(app)
        .direct_supertypes(&FqName::new("app.Impl"))
        .is_none());
}

#[test]
fn facades_of_the_same_package_diff_per_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "module");
    let mut cache = IncrementalClassCache::open(&dir).unwrap();

    let mut from_a = vega_metadata::PackageFacadeProtoData::new("pkg");
    from_a.members.insert("f".to_string(), 1);
    let mut from_b = vega_metadata::PackageFacadeProtoData::new("pkg");
    from_b.members.insert("g".to_string(), 1);

    let a_source = src("A.vg");
    let mut collector = ChangesCollector::new();
    cache
        .save_class(
            &ProtoData::PackageFacade(from_a.clone()),
            Some(a_source.as_path()),
            &mut collector,
        )
        .unwrap();

    // B's facade must diff against B's previous round (nothing), not steal
    // A's blob and report `f` as changed or removed.
    let b_source = src("B.vg");
    let mut collector = ChangesCollector::new();
    cache
        .save_class(
            &ProtoData::PackageFacade(from_b),
            Some(b_source.as_path()),
            &mut collector,
        )
        .unwrap();
    assert!(collector.changes().iter().all(|change| !matches!(
        change,
        ChangeInfo::MembersChanged { names, .. } | ChangeInfo::Removed { names, .. }
            if names.contains("f")
    )));

    // Re-saving A's unchanged facade is a no-op round for A.
    let mut collector = ChangesCollector::new();
    cache
        .save_class(
            &ProtoData::PackageFacade(from_a),
            Some(a_source.as_path()),
            &mut collector,
        )
        .unwrap();
    assert!(collector.changes().is_empty());
}

#[test]
fn moving_a_class_between_files_updates_both_source_maps() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "module");
    let mut cache = IncrementalClassCache::open(&dir).unwrap();

    save(&mut cache, &class("Foo", &[]), "Old.vg");
    save(&mut cache, &class("Foo", &[]), "New.vg");

    assert_eq!(cache.source_file(&FqName::new("Foo")), Some(&src("New.vg")));
    assert!(cache.classes_in_source(&src("Old.vg")).is_none());
}

#[test]
fn expect_actual_linking_round_trip() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "module");
    let mut cache = IncrementalClassCache::open(&dir).unwrap();

    let expect = src("E.vg");
    let actual = src("Act.vg");
    cache.update_complementary_files(
        &BTreeSet::new(),
        &BTreeMap::from([(expect.clone(), BTreeSet::from([actual.clone()]))]),
    );

    assert_eq!(
        cache.get_complementary_files_recursive(&BTreeSet::from([expect.clone()])),
        BTreeSet::from([actual.clone()])
    );
    // The link is bidirectional.
    assert_eq!(
        cache.get_complementary_files_recursive(&BTreeSet::from([actual])),
        BTreeSet::from([expect])
    );
}

#[test]
fn updating_links_for_dirty_files_keeps_links_from_other_files() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "module");
    let mut cache = IncrementalClassCache::open(&dir).unwrap();

    let e1 = src("E1.vg");
    let e2 = src("E2.vg");
    let shared = src("Shared.vg");
    cache.update_complementary_files(
        &BTreeSet::new(),
        &BTreeMap::from([
            (e1.clone(), BTreeSet::from([shared.clone()])),
            (e2.clone(), BTreeSet::from([shared.clone()])),
        ]),
    );

    // Recompiling E1 drops only E1's stale links; E2's survive the union.
    cache.update_complementary_files(&BTreeSet::from([e1.clone()]), &BTreeMap::new());

    assert_eq!(
        cache.get_complementary_files_recursive(&BTreeSet::from([e2])),
        BTreeSet::from([shared.clone()])
    );
    assert_eq!(
        cache.get_complementary_files_recursive(&BTreeSet::from([e1])),
        BTreeSet::new()
    );
}

#[test]
fn dirty_file_pulls_its_whole_sealed_hierarchy() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "module");
    let mut cache = IncrementalClassCache::open(&dir).unwrap();

    save(&mut cache, &sealed_class("S", &[]), "S.vg");
    save(&mut cache, &class("X", &["S"]), "X.vg");
    save(&mut cache, &class("Y", &["S"]), "Y.vg");

    let complements = cache.get_complementary_files_recursive(&BTreeSet::from([src("X.vg")]));
    assert_eq!(complements, BTreeSet::from([src("S.vg"), src("Y.vg")]));
}

#[test]
fn dirty_output_classes_are_taken_once() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "module");
    let mut cache = IncrementalClassCache::open(&dir).unwrap();

    cache.mark_outputs_dirty(&src("Foo.vg"), ["Foo".to_string(), "Foo$Inner".to_string()]);
    assert_eq!(
        cache.take_dirty_outputs(&src("Foo.vg")),
        BTreeSet::from(["Foo".to_string(), "Foo$Inner".to_string()])
    );
    assert!(cache.take_dirty_outputs(&src("Foo.vg")).is_empty());
}

#[test]
fn caches_survive_flush_and_reopen() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = cache_dir(&tmp, "module");

    let mut cache = IncrementalClassCache::open(&dir).unwrap();
    save(&mut cache, &sealed_class("S", &[]), "S.vg");
    save(&mut cache, &class("X", &["S"]), "X.vg");
    cache.flush(false).unwrap();
    drop(cache);

    let cache = IncrementalClassCache::open(&dir).unwrap();
    assert!(cache.is_sealed(&FqName::new("S")));
    assert_eq!(
        cache.direct_subtypes(&FqName::new("S")),
        Some(&BTreeSet::from([FqName::new("X")]))
    );
    assert_eq!(cache.source_file(&FqName::new("X")), Some(&src("X.vg")));
}
