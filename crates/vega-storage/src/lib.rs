//! Persistent key-value map layer backing Vega's incremental caches.
//!
//! ## On-disk layout (inventory)
//!
//! Each module's caches live in one [`CacheDirectory`]:
//! - `manifest.json`: version manifest ([`CACHE_MANIFEST_VERSION`],
//!   [`STORAGE_SCHEMA_VERSION`], Vega version); incompatible manifests clean
//!   the directory, corrupt ones are fatal
//! - `.lock`: exclusive lockfile held for the directory's lifetime; a second
//!   opener fails fast with [`StorageError::DirectoryLocked`]
//! - `<map>.tab`: one file per logical [`PersistentMap`], bincode with a
//!   magic + per-map schema version header
//! - `counters`: the lookup storage's file-id high-water-mark, plain text
//!   (owned by `vega-incremental`, listed here for completeness)
//!
//! Map files are replaced atomically on flush; a round's writes can instead be
//! staged into a [`WriteTransaction`] and committed or rolled back as a unit.

mod codec;
mod dir;
mod error;
mod map;
mod txn;
mod write;

pub use codec::PAYLOAD_LIMIT_BYTES;
pub use dir::{CacheDirectory, CACHE_MANIFEST_VERSION, STORAGE_SCHEMA_VERSION};
pub use error::{Result, StorageError};
pub use map::PersistentMap;
pub use txn::WriteTransaction;
pub use write::atomic_write;
