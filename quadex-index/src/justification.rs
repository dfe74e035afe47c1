//! Justification storage.
//!
//! Keys are `head ‖ tail…` in the relation's primary order; values are empty.
//! All justifications for one head share a key prefix, which makes lookup and
//! cascade deletion a single range scan.

use crate::error::{RelationError, Result};
use crate::storage::SortedIndex;
use quadex_core::{successor, Justification, KeyBuilder, Spo, StatementRecord};
use std::sync::Arc;

/// A head-only key cannot be decoded again, so every justification needs a tail.
pub(crate) fn check_tails(batch: &[Justification]) -> Result<()> {
    match batch.iter().find(|j| j.tail.is_empty()) {
        Some(j) => Err(RelationError::invalid_input(format!(
            "justification for {} has an empty tail",
            j.head
        ))),
        None => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct JustificationStore {
    index: Arc<dyn SortedIndex>,
    quads: bool,
    chunk: usize,
}

impl JustificationStore {
    pub fn new(index: Arc<dyn SortedIndex>, quads: bool, chunk: usize) -> Self {
        Self {
            index,
            quads,
            chunk: chunk.max(1),
        }
    }

    /// Write every justification not already stored.
    ///
    /// Returns the number of keys actually written; re-adding an existing
    /// justification counts zero. A justification without a tail is
    /// rejected before anything is written.
    pub fn add(&self, batch: &[Justification]) -> Result<u64> {
        check_tails(batch)?;
        let mut kb = KeyBuilder::with_capacity(64);
        let mut keys: Vec<Vec<u8>> = batch
            .iter()
            .map(|j| j.encode_key(&mut kb, self.quads))
            .collect();
        keys.sort_unstable();
        keys.dedup();

        let mut written = 0;
        for key in &keys {
            if !self.index.contains(key)? {
                self.index.insert(key, &[])?;
                written += 1;
            }
        }
        Ok(written)
    }

    pub fn contains(&self, justification: &Justification) -> Result<bool> {
        let mut kb = KeyBuilder::with_capacity(64);
        self.index
            .contains(&justification.encode_key(&mut kb, self.quads))
    }

    fn head_keys(&self, kb: &mut KeyBuilder, head: &Spo) -> Result<Vec<Vec<u8>>> {
        let prefix = Justification::head_prefix(kb, head, self.quads);
        let to = successor(&prefix)?;
        let mut keys = Vec::new();
        let mut from = prefix;
        loop {
            let batch = self.index.read_range(Some(&from), Some(&to), self.chunk)?;
            let done = batch.len() < self.chunk;
            if let Some((last, _)) = batch.last() {
                from = last.clone();
                from.push(0);
            }
            keys.extend(batch.into_iter().map(|(k, _)| k));
            if done {
                break;
            }
        }
        Ok(keys)
    }

    /// Every stored justification for `head`, in key order.
    pub fn justifications_for(&self, head: &Spo) -> Result<Vec<Justification>> {
        let mut kb = KeyBuilder::with_capacity(64);
        self.head_keys(&mut kb, head)?
            .iter()
            .map(|k| Justification::decode_key(k, self.quads).map_err(Into::into))
            .collect()
    }

    /// Remove every justification whose head is `head`.
    pub fn cascade_delete_by_head(&self, head: &Spo) -> Result<u64> {
        let mut kb = KeyBuilder::with_capacity(64);
        self.delete_by_head(&mut kb, head)
    }

    fn delete_by_head(&self, kb: &mut KeyBuilder, head: &Spo) -> Result<u64> {
        let mut removed = 0;
        for key in self.head_keys(kb, head)? {
            if self.index.remove(&key)?.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Cascade delete for a batch of retracted statements.
    pub fn cascade_delete(&self, records: &[StatementRecord]) -> Result<u64> {
        let mut kb = KeyBuilder::with_capacity(64);
        let mut removed = 0;
        for record in records {
            removed += self.delete_by_head(&mut kb, &record.spo)?;
        }
        Ok(removed)
    }

    pub fn len(&self) -> Result<u64> {
        self.index.entry_count()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryIndex;
    use quadex_core::Iv;

    fn t(s: u64, p: u64, o: u64) -> Spo {
        Spo::triple(Iv::uri(s), Iv::uri(p), Iv::uri(o))
    }

    fn store() -> JustificationStore {
        JustificationStore::new(Arc::new(MemoryIndex::new("just")), false, 2)
    }

    #[test]
    fn test_add_is_idempotent() {
        let store = store();
        let batch = vec![
            Justification::new(t(1, 2, 3), vec![t(4, 5, 6)]),
            Justification::new(t(1, 2, 3), vec![t(7, 8, 9)]),
        ];
        assert_eq!(store.add(&batch).unwrap(), 2);
        assert_eq!(store.add(&batch).unwrap(), 0);

        let dup = vec![batch[0].clone(), batch[0].clone()];
        assert_eq!(store.add(&dup).unwrap(), 0);
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_lookup_and_cascade_by_head() {
        let store = store();
        let batch = vec![
            Justification::new(t(1, 2, 3), vec![t(4, 5, 6)]),
            Justification::new(t(1, 2, 3), vec![t(4, 5, 7), t(4, 5, 8)]),
            Justification::new(t(1, 2, 3), vec![t(9, 9, 9)]),
            Justification::new(t(1, 2, 4), vec![t(4, 5, 6)]),
        ];
        store.add(&batch).unwrap();

        let found = store.justifications_for(&t(1, 2, 3)).unwrap();
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|j| j.head == t(1, 2, 3)));

        assert_eq!(store.cascade_delete_by_head(&t(1, 2, 3)).unwrap(), 3);
        assert_eq!(store.cascade_delete_by_head(&t(1, 2, 3)).unwrap(), 0);
        assert!(store
            .contains(&Justification::new(t(1, 2, 4), vec![t(4, 5, 6)]))
            .unwrap());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_empty_tail_is_rejected() {
        let store = store();
        let batch = vec![
            Justification::new(t(1, 2, 3), vec![t(4, 5, 6)]),
            Justification::new(t(1, 2, 3), Vec::new()),
        ];
        assert!(matches!(
            store.add(&batch),
            Err(RelationError::InvalidInput(_))
        ));
        assert!(store.is_empty().unwrap());
        assert!(store.justifications_for(&t(1, 2, 3)).unwrap().is_empty());
    }
}
