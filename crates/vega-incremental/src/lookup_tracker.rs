use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use vega_core::{FqName, LookupSymbolKey, Position, ScopeKind};

/// One lookup fact emitted during semantic analysis: `name` was resolved in
/// `scope` from `file`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupRecord {
    pub file: PathBuf,
    pub scope: FqName,
    pub scope_kind: ScopeKind,
    pub name: String,
    pub position: Option<Position>,
}

/// Collects lookup records during a compilation round, feeding
/// [`LookupStorage::add_all`](crate::LookupStorage::add_all) at round end.
///
/// A single expression can trigger many structurally identical lookup calls
/// in a row, so consecutive duplicates (same file, scope, name, position) are
/// dropped through a one-element cache. This only cuts redundant calls; the
/// set of distinct recorded lookups is unchanged.
#[derive(Debug, Default)]
pub struct LookupTracker {
    last: Option<LookupRecord>,
    lookups: BTreeMap<LookupSymbolKey, BTreeSet<PathBuf>>,
    paths: BTreeSet<PathBuf>,
}

impl LookupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: LookupRecord) {
        if self.last.as_ref() == Some(&record) {
            return;
        }

        let key = LookupSymbolKey::new(record.name.clone(), record.scope.clone());
        self.lookups
            .entry(key)
            .or_default()
            .insert(record.file.clone());
        self.paths.insert(record.file.clone());
        self.last = Some(record);
    }

    pub fn lookups(&self) -> &BTreeMap<LookupSymbolKey, BTreeSet<PathBuf>> {
        &self.lookups
    }

    pub fn paths(&self) -> &BTreeSet<PathBuf> {
        &self.paths
    }

    pub fn into_parts(self) -> (BTreeMap<LookupSymbolKey, BTreeSet<PathBuf>>, BTreeSet<PathBuf>) {
        (self.lookups, self.paths)
    }
}
