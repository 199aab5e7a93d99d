//! Incremental-compilation cache and change propagation.
//!
//! The pipeline, one compilation round at a time:
//! 1. the front end compiles the current dirty set and hands each unit's
//!    metadata to [`IncrementalClassCache::save_class`], which diffs it
//!    against the previous round into a [`ChangesCollector`];
//! 2. removed classes go through
//!    [`CompilationContext::remove_classes`];
//! 3. [`changes_to_dirty_data`] expands the collected [`ChangeInfo`] facts
//!    over the class hierarchies into [`DirtyData`];
//! 4. [`dirty_files_from`] resolves that to concrete files through
//!    [`LookupStorage`] and the class→source maps, and the orchestrator
//!    schedules the next round over them.
//!
//! The crate is a library with no user-facing output: it reports facts, and
//! the surrounding build system turns them into diagnostics.

mod changes;
mod class_cache;
mod context;
mod error;
mod lookup_storage;
mod lookup_tracker;
mod propagation;

pub use changes::{ChangeInfo, ChangesCollector};
pub use class_cache::{ClassAttributes, IncrementalClassCache, CLASS_CACHE_SCHEMA_VERSION};
pub use context::{CacheId, CompilationContext};
pub use error::{CacheError, Result};
pub use lookup_storage::{LookupGcPolicy, LookupStorage, LOOKUPS_SCHEMA_VERSION};
pub use lookup_tracker::{LookupRecord, LookupTracker};
pub use propagation::{
    changes_to_dirty_data, dirty_files_from, find_sealed_supertypes, with_subtypes, DirtyData,
};
