use crate::error::Result;
use crate::write::atomic_write;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// Buffers a compilation round's map writes so they hit disk as a unit.
///
/// Nothing touches disk until [`WriteTransaction::commit`]; dropping the
/// transaction (or calling [`WriteTransaction::rollback`]) discards every
/// staged write, leaving the previous on-disk state untouched. Staged writes
/// are keyed by path, so re-staging the same map replaces its earlier bytes.
#[derive(Debug, Default)]
pub struct WriteTransaction {
    staged: BTreeMap<PathBuf, Vec<u8>>,
}

impl WriteTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&mut self, path: PathBuf, bytes: Vec<u8>) {
        self.staged.insert(path, bytes);
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Apply every staged write, each one atomically, in path order.
    ///
    /// The previous contents of each destination are snapshotted before it is
    /// replaced; when a later write fails, every already-replaced file is put
    /// back and the error is returned, so a detected failure leaves the
    /// previous round's state on disk. A crash between renames can still
    /// leave a mix, which the manifest/schema gating absorbs on next open.
    pub fn commit(self) -> Result<()> {
        let mut replaced: Vec<(PathBuf, Option<Vec<u8>>)> = Vec::new();
        for (path, bytes) in &self.staged {
            let previous = match snapshot(path) {
                Ok(previous) => previous,
                Err(err) => {
                    restore(&replaced);
                    return Err(err.into());
                }
            };
            if let Err(err) = atomic_write(path, bytes) {
                restore(&replaced);
                return Err(err);
            }
            replaced.push((path.clone(), previous));
        }
        tracing::debug!(
            target = "vega.storage",
            files = self.staged.len(),
            "committed write transaction"
        );
        Ok(())
    }

    /// Discard all staged writes.
    pub fn rollback(self) {
        tracing::debug!(
            target = "vega.storage",
            files = self.staged.len(),
            "rolled back write transaction"
        );
    }
}

fn snapshot(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

fn restore(replaced: &[(PathBuf, Option<Vec<u8>>)]) {
    for (path, previous) in replaced.iter().rev() {
        let outcome = match previous {
            Some(bytes) => atomic_write(path, bytes).err(),
            None => match std::fs::remove_file(path) {
                Ok(()) => None,
                Err(err) if err.kind() == io::ErrorKind::NotFound => None,
                Err(err) => Some(err.into()),
            },
        };
        if let Some(err) = outcome {
            tracing::debug!(
                target = "vega.storage",
                path = %path.display(),
                error = %err,
                "failed to restore file while unwinding a commit"
            );
        }
    }
}
