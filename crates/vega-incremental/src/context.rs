use crate::changes::ChangesCollector;
use crate::class_cache::IncrementalClassCache;
use crate::error::Result;
use crate::propagation::with_subtypes;
use std::collections::BTreeSet;
use vega_core::FqName;

/// Index of a module cache inside a [`CompilationContext`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheId(usize);

/// Per-build-invocation owner of all module caches and their dependency
/// links.
///
/// Cross-module relationships are a directed graph over [`CacheId`]s held
/// here, not back-pointers inside the caches; hierarchy traversals take an
/// explicit slice of cache handles. Constructed once per build invocation;
/// there is no process-wide state.
#[derive(Debug, Default)]
pub struct CompilationContext {
    caches: Vec<IncrementalClassCache>,
    /// Per cache: the caches of modules that depend on it. Read for
    /// hierarchy traversal, mutated only through this context.
    dependents: Vec<Vec<CacheId>>,
}

impl CompilationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(&mut self, cache: IncrementalClassCache) -> CacheId {
        self.caches.push(cache);
        self.dependents.push(Vec::new());
        CacheId(self.caches.len() - 1)
    }

    pub fn set_dependents(&mut self, id: CacheId, dependents: Vec<CacheId>) {
        self.dependents[id.0] = dependents;
    }

    pub fn cache(&self, id: CacheId) -> &IncrementalClassCache {
        &self.caches[id.0]
    }

    pub fn cache_mut(&mut self, id: CacheId) -> &mut IncrementalClassCache {
        &mut self.caches[id.0]
    }

    /// The module's own cache first, then its dependents' caches: the handle
    /// slice hierarchy traversals run over.
    pub fn this_with_dependent_caches(&self, id: CacheId) -> Vec<&IncrementalClassCache> {
        let mut caches = vec![self.cache(id)];
        caches.extend(self.dependents[id.0].iter().map(|dep| self.cache(*dep)));
        caches
    }

    /// Remove classes from module `id`'s cache.
    ///
    /// Order matters: the subclasses affected by the removal are recorded
    /// (as non-subclass-cascading signature changes) from the *pre-removal*
    /// subtype closure across this cache and its dependents, then adjacency
    /// is stripped everywhere, then local records are deleted.
    pub fn remove_classes(
        &mut self,
        id: CacheId,
        removed: &BTreeSet<FqName>,
        collector: &mut ChangesCollector,
    ) -> Result<()> {
        for fq_name in removed {
            if let Some(old) = self.cache(id).stored_proto(fq_name)? {
                collector.collect_proto_changes(Some(&old), None, false);
            }
        }

        let affected_subclasses: BTreeSet<FqName> = {
            let caches = self.this_with_dependent_caches(id);
            removed
                .iter()
                .flat_map(|fq_name| with_subtypes(fq_name, &caches))
                .filter(|fq_name| !removed.contains(fq_name))
                .collect()
        };
        for subclass in affected_subclasses {
            collector.collect_signature_changed(subclass, false);
        }

        let dependent_ids = self.dependents[id.0].clone();
        self.cache_mut(id).strip_from_adjacency(removed);
        for dep in dependent_ids {
            self.cache_mut(dep).strip_from_adjacency(removed);
        }

        self.cache_mut(id).remove_local_records(removed);
        Ok(())
    }

    /// Flush every module cache.
    pub fn flush(&mut self, memory_only: bool) -> Result<()> {
        for cache in &mut self.caches {
            cache.flush(memory_only)?;
        }
        Ok(())
    }
}
