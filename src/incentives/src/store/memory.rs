//! In-memory backend for tests and ephemeral nodes

use std::collections::BTreeMap;

use super::{BatchOp, KvBackend};
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .entries
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn apply(&mut self, batch: Vec<BatchOp>) -> Result<()> {
        for op in batch {
            match op {
                BatchOp::Put(key, value) => {
                    self.entries.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    self.entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_prefix_stops_at_prefix_end() {
        let mut backend = MemoryBackend::new();
        backend
            .apply(vec![
                BatchOp::Put(b"a/1".to_vec(), vec![1]),
                BatchOp::Put(b"a/2".to_vec(), vec![2]),
                BatchOp::Put(b"b/1".to_vec(), vec![3]),
            ])
            .unwrap();

        let entries = backend.scan_prefix(b"a/").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].1, vec![2]);
    }

    #[test]
    fn test_delete() {
        let mut backend = MemoryBackend::new();
        backend.apply(vec![BatchOp::Put(b"k".to_vec(), vec![9])]).unwrap();
        backend.apply(vec![BatchOp::Delete(b"k".to_vec())]).unwrap();
        assert!(backend.get(b"k").unwrap().is_none());
        assert!(backend.is_empty());
    }
}
