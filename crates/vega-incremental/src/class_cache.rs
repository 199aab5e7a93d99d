use crate::changes::ChangesCollector;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use vega_core::FqName;
use vega_metadata::{ClassProtoData, ProtoData};
use vega_storage::{CacheDirectory, PersistentMap, WriteTransaction};

pub const CLASS_CACHE_SCHEMA_VERSION: u32 = 1;

/// Per-class flags relevant to change propagation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassAttributes {
    pub is_sealed: bool,
}

/// Per-module cache of class metadata, hierarchy adjacency, and file
/// associations.
///
/// Class state per fqName: unknown → known (attributes, parents, source) →
/// dirty → removed or known again. The subtype/supertype maps are kept
/// mutually consistent: `child ∈ subtypes[parent]` iff
/// `parent ∈ supertypes[child]` after every operation.
#[derive(Debug)]
pub struct IncrementalClassCache {
    attributes: PersistentMap<FqName, ClassAttributes>,
    subtypes: PersistentMap<FqName, BTreeSet<FqName>>,
    supertypes: PersistentMap<FqName, BTreeSet<FqName>>,
    class_to_source: PersistentMap<FqName, PathBuf>,
    source_to_classes: PersistentMap<PathBuf, BTreeSet<FqName>>,
    dirty_outputs: PersistentMap<PathBuf, BTreeSet<String>>,
    complementary: PersistentMap<PathBuf, BTreeSet<PathBuf>>,
    protos: PersistentMap<FqName, Vec<u8>>,
}

impl IncrementalClassCache {
    pub fn open(dir: &CacheDirectory) -> Result<Self> {
        let root = dir.root();
        let v = CLASS_CACHE_SCHEMA_VERSION;
        Ok(Self {
            attributes: PersistentMap::open(root, "class-attributes", v)?,
            subtypes: PersistentMap::open(root, "subtypes", v)?,
            supertypes: PersistentMap::open(root, "supertypes", v)?,
            class_to_source: PersistentMap::open(root, "class-to-source", v)?,
            source_to_classes: PersistentMap::open(root, "source-to-classes", v)?,
            dirty_outputs: PersistentMap::open(root, "dirty-outputs", v)?,
            complementary: PersistentMap::open(root, "complementary", v)?,
            protos: PersistentMap::open(root, "protos", v)?,
        })
    }

    /// Ingest one compiled unit: diff it against the previously stored
    /// metadata (recording the differences into `collector`), persist the new
    /// blob, and update class storage.
    ///
    /// Classes are stored under their own fqName. Package facades are stored
    /// under a per-file key (the package name plus the file's facade class
    /// name), because several files contribute facades to one package and
    /// each must diff against its own previous round, not its neighbor's.
    pub fn save_class(
        &mut self,
        proto: &ProtoData,
        source: Option<&Path>,
        collector: &mut ChangesCollector,
    ) -> Result<()> {
        let key = proto_storage_key(proto, source);

        let old = self.stored_proto(&key)?;
        collector.collect_proto_changes(old.as_ref(), Some(proto), false);
        self.protos.set(key.clone(), proto.to_bytes()?);

        match proto {
            ProtoData::Class(class) => self.add_to_class_storage(class, source),
            ProtoData::PackageFacade(_) => self.record_source(&key, source),
        }
        Ok(())
    }

    /// Apply a newly compiled class's supertypes and attributes.
    ///
    /// The parent set is diffed against the previously recorded one and only
    /// the delta touches the subtype map: removed parents lose this child,
    /// new parents gain it. A clear-and-reinsert would churn adjacency
    /// entries that dependent caches read through shared handles.
    pub fn add_to_class_storage(&mut self, class: &ClassProtoData, source: Option<&Path>) {
        let fq_name = class.fq_name.clone();
        let new_parents: BTreeSet<FqName> = class.recorded_supertypes().cloned().collect();
        let old_parents: BTreeSet<FqName> =
            self.supertypes.get(&fq_name).cloned().unwrap_or_default();

        let this_class = BTreeSet::from([fq_name.clone()]);
        for parent in old_parents.difference(&new_parents) {
            self.subtypes.remove_values(parent, &this_class);
        }
        for parent in new_parents.difference(&old_parents) {
            self.subtypes.append(parent.clone(), [fq_name.clone()]);
        }
        if new_parents != old_parents {
            if new_parents.is_empty() {
                self.supertypes.remove(&fq_name);
            } else {
                self.supertypes.set(fq_name.clone(), new_parents);
            }
        }

        self.attributes.set(
            fq_name.clone(),
            ClassAttributes {
                is_sealed: class.is_sealed,
            },
        );
        self.record_source(&fq_name, source);
    }

    fn record_source(&mut self, fq_name: &FqName, source: Option<&Path>) {
        let previous = self.class_to_source.get(fq_name).cloned();
        match source {
            Some(source) => {
                if let Some(previous) = previous.filter(|prev| prev != source) {
                    self.source_to_classes
                        .remove_values(&previous, &BTreeSet::from([fq_name.clone()]));
                }
                self.class_to_source.set(fq_name.clone(), source.to_path_buf());
                self.source_to_classes
                    .append(source.to_path_buf(), [fq_name.clone()]);
            }
            // No source: the class comes from a pre-compiled binary.
            None => {
                if let Some(previous) = previous {
                    self.class_to_source.remove(fq_name);
                    self.source_to_classes
                        .remove_values(&previous, &BTreeSet::from([fq_name.clone()]));
                }
            }
        }
    }

    /// Strip `removed` names from both adjacency directions.
    ///
    /// Used on this cache and on every dependent cache when classes
    /// disappear; recording the affected subclasses must happen before this
    /// runs, because it needs the pre-removal closure (see
    /// [`CompilationContext::remove_classes`](crate::CompilationContext::remove_classes)).
    pub(crate) fn strip_from_adjacency(&mut self, removed: &BTreeSet<FqName>) {
        for fq_name in removed {
            let this_class = BTreeSet::from([fq_name.clone()]);
            if let Some(children) = self.subtypes.remove(fq_name) {
                for child in &children {
                    self.supertypes.remove_values(child, &this_class);
                }
            }
            if let Some(parents) = self.supertypes.remove(fq_name) {
                for parent in &parents {
                    self.subtypes.remove_values(parent, &this_class);
                }
            }
        }
    }

    /// The previously stored metadata for `fq_name`, decoded.
    pub(crate) fn stored_proto(&self, fq_name: &FqName) -> Result<Option<ProtoData>> {
        match self.protos.get(fq_name) {
            Some(bytes) => Ok(Some(ProtoData::from_bytes(bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete this cache's attribute/source/proto records for `removed`.
    pub(crate) fn remove_local_records(&mut self, removed: &BTreeSet<FqName>) {
        for fq_name in removed {
            self.attributes.remove(fq_name);
            self.protos.remove(fq_name);
            if let Some(source) = self.class_to_source.remove(fq_name) {
                self.source_to_classes
                    .remove_values(&source, &BTreeSet::from([fq_name.clone()]));
            }
        }
    }

    /// Files that must be recompiled together with `dirty_files`:
    /// expect/actual counterparts, and every file of any sealed hierarchy a
    /// dirty file's classes participate in (exhaustiveness checking needs the
    /// whole hierarchy in one round).
    ///
    /// Breadth-first over files; the processed-file and processed-class sets
    /// bound the traversal (each file and class is visited at most once).
    /// The result excludes `dirty_files` themselves.
    pub fn get_complementary_files_recursive(
        &self,
        dirty_files: &BTreeSet<PathBuf>,
    ) -> BTreeSet<PathBuf> {
        let mut result = BTreeSet::new();
        let mut processed_files: BTreeSet<PathBuf> = dirty_files.clone();
        let mut processed_classes: BTreeSet<FqName> = BTreeSet::new();
        let mut queue: VecDeque<PathBuf> = dirty_files.iter().cloned().collect();

        while let Some(file) = queue.pop_front() {
            if let Some(links) = self.complementary.get(&file) {
                for link in links {
                    if processed_files.insert(link.clone()) {
                        result.insert(link.clone());
                        queue.push_back(link.clone());
                    }
                }
            }

            let Some(classes) = self.source_to_classes.get(&file) else {
                continue;
            };
            for class in classes {
                if !processed_classes.insert(class.clone()) {
                    continue;
                }
                for sealed in self.direct_sealed_supertypes(class) {
                    for member in self.subtype_closure(&sealed) {
                        processed_classes.insert(member.clone());
                        let Some(source) = self.class_to_source.get(&member) else {
                            continue;
                        };
                        if processed_files.insert(source.clone()) {
                            result.insert(source.clone());
                            queue.push_back(source.clone());
                        }
                    }
                }
            }
        }

        result
    }

    /// Replace the dirty files' expect/actual links with `expect_actual_map`,
    /// keeping links established from the other side: old links of dirty
    /// files are dropped in both directions, then the new associations are
    /// unioned in bidirectionally.
    pub fn update_complementary_files(
        &mut self,
        dirty_files: &BTreeSet<PathBuf>,
        expect_actual_map: &BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    ) {
        for file in dirty_files {
            let this_file = BTreeSet::from([file.clone()]);
            if let Some(links) = self.complementary.remove(file) {
                for link in &links {
                    self.complementary.remove_values(link, &this_file);
                }
            }
        }

        for (expect, actuals) in expect_actual_map {
            self.complementary.append(expect.clone(), actuals.iter().cloned());
            for actual in actuals {
                self.complementary.append(actual.clone(), [expect.clone()]);
            }
        }
    }

    /// Record output class names produced for `source`, pending deletion or
    /// regeneration in the next round.
    pub fn mark_outputs_dirty(
        &mut self,
        source: &Path,
        class_names: impl IntoIterator<Item = String>,
    ) {
        self.dirty_outputs
            .append(source.to_path_buf(), class_names);
    }

    /// Take (and clear) the dirty output class names recorded for `source`.
    pub fn take_dirty_outputs(&mut self, source: &Path) -> BTreeSet<String> {
        self.dirty_outputs
            .remove(&source.to_path_buf())
            .unwrap_or_default()
    }

    pub fn direct_subtypes(&self, fq_name: &FqName) -> Option<&BTreeSet<FqName>> {
        self.subtypes.get(fq_name)
    }

    pub fn direct_supertypes(&self, fq_name: &FqName) -> Option<&BTreeSet<FqName>> {
        self.supertypes.get(fq_name)
    }

    pub fn is_sealed(&self, fq_name: &FqName) -> bool {
        self.attributes
            .get(fq_name)
            .is_some_and(|attrs| attrs.is_sealed)
    }

    pub fn source_file(&self, fq_name: &FqName) -> Option<&PathBuf> {
        self.class_to_source.get(fq_name)
    }

    pub fn classes_in_source(&self, source: &Path) -> Option<&BTreeSet<FqName>> {
        self.source_to_classes.get(&source.to_path_buf())
    }

    /// Direct supertypes of `fq_name` (this cache only) that are sealed.
    fn direct_sealed_supertypes(&self, fq_name: &FqName) -> Vec<FqName> {
        let Some(parents) = self.supertypes.get(fq_name) else {
            return Vec::new();
        };
        parents
            .iter()
            .filter(|parent| self.is_sealed(parent))
            .cloned()
            .collect()
    }

    /// `fq_name` plus its transitive subtypes within this cache.
    fn subtype_closure(&self, fq_name: &FqName) -> BTreeSet<FqName> {
        let mut closure = BTreeSet::from([fq_name.clone()]);
        let mut queue: VecDeque<FqName> = VecDeque::from([fq_name.clone()]);
        while let Some(next) = queue.pop_front() {
            if let Some(children) = self.subtypes.get(&next) {
                for child in children {
                    if closure.insert(child.clone()) {
                        queue.push_back(child.clone());
                    }
                }
            }
        }
        closure
    }

    pub fn flush(&mut self, memory_only: bool) -> Result<()> {
        self.attributes.flush(memory_only)?;
        self.subtypes.flush(memory_only)?;
        self.supertypes.flush(memory_only)?;
        self.class_to_source.flush(memory_only)?;
        self.source_to_classes.flush(memory_only)?;
        self.dirty_outputs.flush(memory_only)?;
        self.complementary.flush(memory_only)?;
        self.protos.flush(memory_only)?;
        Ok(())
    }

    /// Stage all maps into `txn`; call [`IncrementalClassCache::mark_committed`]
    /// after the transaction commits.
    pub fn stage(&self, txn: &mut WriteTransaction) -> Result<()> {
        self.attributes.stage(txn)?;
        self.subtypes.stage(txn)?;
        self.supertypes.stage(txn)?;
        self.class_to_source.stage(txn)?;
        self.source_to_classes.stage(txn)?;
        self.dirty_outputs.stage(txn)?;
        self.complementary.stage(txn)?;
        self.protos.stage(txn)?;
        Ok(())
    }

    pub fn mark_committed(&mut self) {
        self.attributes.mark_clean();
        self.subtypes.mark_clean();
        self.supertypes.mark_clean();
        self.class_to_source.mark_clean();
        self.source_to_classes.mark_clean();
        self.dirty_outputs.mark_clean();
        self.complementary.mark_clean();
        self.protos.mark_clean();
    }

    pub fn clean(&mut self) -> Result<()> {
        self.attributes.clean()?;
        self.subtypes.clean()?;
        self.supertypes.clean()?;
        self.class_to_source.clean()?;
        self.source_to_classes.clean()?;
        self.dirty_outputs.clean()?;
        self.complementary.clean()?;
        self.protos.clean()?;
        Ok(())
    }
}

fn proto_storage_key(proto: &ProtoData, source: Option<&Path>) -> FqName {
    match (proto, source) {
        (ProtoData::PackageFacade(facade), Some(source)) => {
            facade.fq_name.child(&facade_class_name(source))
        }
        // Classes are globally unique by fqName; a sourceless facade comes
        // from a pre-compiled binary, which carries one facade per package.
        _ => proto.fq_name().clone(),
    }
}

/// `foo_bar.vg` becomes `Foo_barKt`: first letter upper-cased, `Kt` suffix.
fn facade_class_name(source: &Path) -> String {
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default();
    let mut name = String::with_capacity(stem.len() + 2);
    let mut chars = stem.chars();
    if let Some(first) = chars.next() {
        name.extend(first.to_uppercase());
        name.push_str(chars.as_str());
    }
    name.push_str("Kt");
    name
}
