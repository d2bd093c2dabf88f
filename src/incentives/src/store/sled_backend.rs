//! Sled-backed persistent storage

use std::path::Path;
use tracing::info;

use super::{BatchOp, KvBackend};
use crate::error::{LedgerError, Result};

/// Name of the tree holding all ledger records
pub const LEDGER_TREE: &str = "ledger";

/// Default page cache (64 MB)
pub const DEFAULT_CACHE_CAPACITY: u64 = 64 * 1024 * 1024;

pub struct SledBackend {
    db: sled::Db,
    tree: sled::Tree,
    flush_on_commit: bool,
}

impl SledBackend {
    /// Open (or create) a ledger database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, DEFAULT_CACHE_CAPACITY, true)
    }

    pub fn open_with_config<P: AsRef<Path>>(
        path: P,
        cache_capacity: u64,
        flush_on_commit: bool,
    ) -> Result<Self> {
        let db = sled::Config::default()
            .path(path.as_ref())
            .cache_capacity(cache_capacity)
            .open()
            .map_err(|e| {
                LedgerError::Storage(format!(
                    "failed to open {}: {}",
                    path.as_ref().display(),
                    e
                ))
            })?;
        let tree = db.open_tree(LEDGER_TREE)?;

        info!(
            path = %path.as_ref().display(),
            entries = tree.len(),
            "Opened ledger database"
        );

        Ok(Self {
            db,
            tree,
            flush_on_commit,
        })
    }

    /// Temporary database removed on drop
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::default().temporary(true).open()?;
        let tree = db.open_tree(LEDGER_TREE)?;
        Ok(Self {
            db,
            tree,
            flush_on_commit: false,
        })
    }

    pub fn size_on_disk(&self) -> Result<u64> {
        Ok(self.db.size_on_disk()?)
    }
}

impl KvBackend for SledBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.tree.get(key)?.map(|v| v.to_vec()))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut entries = Vec::new();
        for item in self.tree.scan_prefix(prefix) {
            let (key, value) = item?;
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }

    fn apply(&mut self, batch: Vec<BatchOp>) -> Result<()> {
        let mut sled_batch = sled::Batch::default();
        for op in batch {
            match op {
                BatchOp::Put(key, value) => sled_batch.insert(key, value),
                BatchOp::Delete(key) => sled_batch.remove(key),
            }
        }
        self.tree.apply_batch(sled_batch)?;
        if self.flush_on_commit {
            self.tree.flush()?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.tree.flush()?;
        Ok(())
    }
}
