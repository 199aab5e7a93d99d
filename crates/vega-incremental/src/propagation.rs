use crate::changes::ChangeInfo;
use crate::class_cache::IncrementalClassCache;
use crate::lookup_storage::LookupStorage;
use std::collections::{BTreeSet, VecDeque};
use std::path::PathBuf;
use vega_core::{FqName, LookupSymbolKey, SAM_LOOKUP_NAME};

/// Result of change propagation: what must be recompiled next round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirtyData {
    pub dirty_lookup_symbols: BTreeSet<LookupSymbolKey>,
    pub dirty_classes_fq_names: BTreeSet<FqName>,
    /// Sealed-hierarchy roots whose whole hierarchies must be compiled as a
    /// unit, or exhaustiveness checking would see a partial hierarchy.
    pub force_recompile_together: BTreeSet<FqName>,
}

impl DirtyData {
    pub fn is_empty(&self) -> bool {
        self.dirty_lookup_symbols.is_empty()
            && self.dirty_classes_fq_names.is_empty()
            && self.force_recompile_together.is_empty()
    }
}

/// Expand collected change facts into the transitive set of affected lookup
/// symbols and class fqNames.
///
/// Pure over the supplied caches: no I/O, no failure modes beyond
/// programming-error assertions. A dangling subtype edge expands to a class
/// with no source file and is dropped in the later file-mapping step.
pub fn changes_to_dirty_data(
    changes: &[ChangeInfo],
    caches: &[&IncrementalClassCache],
) -> DirtyData {
    let mut dirty = DirtyData::default();

    for change in changes {
        match change {
            ChangeInfo::SignatureChanged {
                fq_name,
                are_subclasses_affected,
            } => {
                let affected = if *are_subclasses_affected {
                    with_subtypes(fq_name, caches)
                } else {
                    BTreeSet::from([fq_name.clone()])
                };
                for class in affected {
                    // A simple name-based lookup index finds "anyone who
                    // referenced this declaration by name" through the
                    // (short name, parent scope) symbol.
                    let parent = class
                        .parent()
                        .expect("root fqName must not reach lookup-symbol synthesis");
                    dirty
                        .dirty_lookup_symbols
                        .insert(LookupSymbolKey::new(class.short_name(), parent));
                    dirty.dirty_classes_fq_names.insert(class);
                }
            }
            ChangeInfo::MembersChanged { fq_name, names }
            | ChangeInfo::Removed { fq_name, names } => {
                // Member changes can break overrides in any descendant.
                for class in with_subtypes(fq_name, caches) {
                    for name in names {
                        dirty
                            .dirty_lookup_symbols
                            .insert(LookupSymbolKey::new(name.clone(), class.clone()));
                    }
                    // SAM conversion applicability depends on the whole
                    // member set, so it is invalidated on any member change.
                    dirty
                        .dirty_lookup_symbols
                        .insert(LookupSymbolKey::new(SAM_LOOKUP_NAME, class.clone()));
                    dirty.dirty_classes_fq_names.insert(class);
                }
            }
            ChangeInfo::ParentsChanged { parents, .. } => {
                for parent in parents {
                    dirty
                        .force_recompile_together
                        .extend(find_sealed_supertypes(parent, caches));
                }
            }
        }
    }

    dirty
}

/// `fq_name` plus its full transitive subtype closure across `caches`.
///
/// Worklist traversal; each type is enqueued at most once, and the result is
/// a set, so cache iteration order cannot affect it.
pub fn with_subtypes(fq_name: &FqName, caches: &[&IncrementalClassCache]) -> BTreeSet<FqName> {
    let mut closure = BTreeSet::from([fq_name.clone()]);
    let mut queue: VecDeque<FqName> = VecDeque::from([fq_name.clone()]);

    while let Some(next) = queue.pop_front() {
        for cache in caches {
            let Some(children) = cache.direct_subtypes(&next) else {
                continue;
            };
            for child in children {
                if closure.insert(child.clone()) {
                    queue.push_back(child.clone());
                }
            }
        }
    }

    closure
}

/// The sealed classes anchoring `fq_name`'s hierarchy: `fq_name` itself when
/// sealed, otherwise its sealed *direct* supertypes.
///
/// Sealedness is deliberately checked only one hop up, matching the language
/// rule that at most one sealed ancestor level is relevant to exhaustiveness
/// at each point. An unsealed class sandwiched between `fq_name` and a sealed
/// grandparent therefore yields nothing here.
pub fn find_sealed_supertypes(
    fq_name: &FqName,
    caches: &[&IncrementalClassCache],
) -> BTreeSet<FqName> {
    if caches.iter().any(|cache| cache.is_sealed(fq_name)) {
        return BTreeSet::from([fq_name.clone()]);
    }

    let mut sealed = BTreeSet::new();
    for cache in caches {
        let Some(parents) = cache.direct_supertypes(fq_name) else {
            continue;
        };
        for parent in parents {
            if caches.iter().any(|cache| cache.is_sealed(parent)) {
                sealed.insert(parent.clone());
            }
        }
    }
    sealed
}

/// Resolve `dirty_data` to concrete files: lookup symbols through the lookup
/// storage, class fqNames through each cache's class→source map.
///
/// Files already known dirty are filtered out, as are classes with no source
/// file (pre-compiled binaries).
pub fn dirty_files_from(
    dirty_data: &DirtyData,
    lookups: &LookupStorage,
    caches: &[&IncrementalClassCache],
    already_dirty: &BTreeSet<PathBuf>,
) -> BTreeSet<PathBuf> {
    let mut files = BTreeSet::new();

    for symbol in &dirty_data.dirty_lookup_symbols {
        files.extend(lookups.get(symbol));
    }
    for fq_name in &dirty_data.dirty_classes_fq_names {
        for cache in caches {
            if let Some(source) = cache.source_file(fq_name) {
                files.insert(source.clone());
            }
        }
    }

    files.retain(|file| !already_dirty.contains(file));
    files
}
