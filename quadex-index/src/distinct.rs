//! Distinct scans.
//!
//! [`DistinctTermScan`] visits each distinct leading key component once. After
//! yielding a value it seeks the cursor to the successor of that value's
//! prefix, so the cost is one index read per distinct value, not one per
//! tuple.
//!
//! [`DistinctSpoIter`] removes duplicate tuples from any record stream. Seen
//! keys are kept in memory up to a threshold, then spilled to a key-only
//! scratch index.

use crate::cursor::IndexCursor;
use crate::error::Result;
use crate::storage::{IndexManager, SortedIndex};
use quadex_core::codec::decode_context;
use quadex_core::{successor, Iv, KeyBuilder, KeyOrder, Position, StatementRecord};
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;

/// Predicate over distinct term values
pub type TermFilter = Arc<dyn Fn(&Iv) -> bool + Send + Sync>;

/// Distinct values of one key component, ascending.
pub struct DistinctTermScan {
    cursor: IndexCursor,
    key_order: KeyOrder,
    /// Bytes of the fixed prefix preceding the scanned component
    prefix_len: usize,
    position: Position,
    filter: Option<TermFilter>,
    seeks: u64,
}

impl DistinctTermScan {
    /// Scan the component at `known.len()` in `key_order`, under the prefix
    /// fixed by `known`.
    pub(crate) fn open(
        cursor_for: impl FnOnce(Option<Vec<u8>>, Option<Vec<u8>>) -> IndexCursor,
        key_order: KeyOrder,
        known: &[Iv],
        filter: Option<TermFilter>,
    ) -> Result<Self> {
        let slots = key_order.slots();
        if known.len() >= slots.len() {
            return Err(crate::error::RelationError::invalid_input(format!(
                "{} known terms leave no component of {} to scan",
                known.len(),
                key_order
            )));
        }
        let mut kb = KeyBuilder::new();
        for iv in known {
            kb.append(iv);
        }
        let (from, to) = if kb.is_empty() {
            (None, None)
        } else {
            (Some(kb.key()), Some(successor(kb.as_bytes())?))
        };
        Ok(Self {
            cursor: cursor_for(from, to),
            key_order,
            prefix_len: kb.len(),
            position: slots[known.len()],
            filter,
            seeks: 0,
        })
    }

    pub fn key_order(&self) -> KeyOrder {
        self.key_order
    }

    /// Seeks performed so far
    pub fn seeks(&self) -> u64 {
        self.seeks
    }

    pub fn close(&mut self) {
        self.cursor.close();
    }

    fn next_term(&mut self) -> Result<Option<Iv>> {
        loop {
            let Some((key, _)) = self.cursor.next_entry()? else {
                return Ok(None);
            };
            let rest = &key[self.prefix_len..];
            let (term, n) = match self.position {
                Position::C => decode_context(rest)?,
                _ => Iv::decode(rest).map(|(iv, n)| (Some(iv), n))?,
            };
            match successor(&key[..self.prefix_len + n]) {
                Ok(next) => {
                    self.cursor.seek(next);
                    self.seeks += 1;
                }
                Err(_) => self.cursor.close(),
            }
            // the null context is a placeholder, not a term
            let Some(term) = term else { continue };
            if self.filter.as_ref().map_or(true, |f| f(&term)) {
                return Ok(Some(term));
            }
        }
    }
}

impl Iterator for DistinctTermScan {
    type Item = Result<Iv>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_term().transpose()
    }
}

impl fmt::Debug for DistinctTermScan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistinctTermScan")
            .field("key_order", &self.key_order)
            .field("position", &self.position)
            .field("seeks", &self.seeks)
            .finish()
    }
}

/// Duplicate-free view of a record stream, keyed on the tuple alone.
pub struct DistinctSpoIter<I> {
    source: I,
    key_order: KeyOrder,
    kb: KeyBuilder,
    seen: FxHashSet<Vec<u8>>,
    spill: Option<Arc<dyn SortedIndex>>,
    threshold: usize,
    manager: Arc<dyn IndexManager>,
}

impl<I> DistinctSpoIter<I>
where
    I: Iterator<Item = Result<StatementRecord>>,
{
    pub(crate) fn new(
        source: I,
        quads: bool,
        threshold: usize,
        manager: Arc<dyn IndexManager>,
    ) -> Self {
        Self {
            source,
            key_order: KeyOrder::primary(quads),
            kb: KeyBuilder::new(),
            seen: FxHashSet::default(),
            spill: None,
            threshold: threshold.max(1),
            manager,
        }
    }

    /// Whether seen keys have moved to a scratch index
    pub fn has_spilled(&self) -> bool {
        self.spill.is_some()
    }

    fn spill(&mut self) -> Result<()> {
        let index = self.manager.temp_index()?;
        for key in self.seen.drain() {
            index.insert(&key, &[])?;
        }
        tracing::debug!(
            threshold = self.threshold,
            "distinct tuple scan spilled to scratch index"
        );
        self.spill = Some(index);
        Ok(())
    }

    /// Record `key`; returns whether it was new.
    fn first_sighting(&mut self, key: Vec<u8>) -> Result<bool> {
        if let Some(index) = &self.spill {
            return Ok(index.insert(&key, &[])?.is_none());
        }
        let fresh = self.seen.insert(key);
        if fresh && self.seen.len() >= self.threshold {
            self.spill()?;
        }
        Ok(fresh)
    }

    fn next_record(&mut self) -> Result<Option<StatementRecord>> {
        while let Some(record) = self.source.next() {
            let record = record?;
            let key = self.key_order.encode_key(&mut self.kb, &record.spo);
            if self.first_sighting(key)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

impl<I> Iterator for DistinctSpoIter<I>
where
    I: Iterator<Item = Result<StatementRecord>>,
{
    type Item = Result<StatementRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

impl<I> fmt::Debug for DistinctSpoIter<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistinctSpoIter")
            .field("in_memory", &self.seen.len())
            .field("spilled", &self.spill.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::CursorTracker;
    use crate::storage::{MemoryIndex, MemoryIndexManager};
    use quadex_core::Spo;

    fn spo(s: u64, p: u64, o: u64) -> Spo {
        Spo::triple(Iv::uri(s), Iv::uri(p), Iv::uri(o))
    }

    fn pos_index(tuples: &[Spo]) -> Arc<MemoryIndex> {
        let index = Arc::new(MemoryIndex::new("pos"));
        let mut kb = KeyBuilder::new();
        for t in tuples {
            index.insert(&KeyOrder::Pos.encode_key(&mut kb, t), &[0]).unwrap();
        }
        index
    }

    #[test]
    fn test_one_read_per_distinct_term() {
        let mut tuples = Vec::new();
        for p in [3, 5, 9] {
            for s in 0..50 {
                tuples.push(spo(s, p, s % 4));
            }
        }
        let index = pos_index(&tuples);
        let tracker = Arc::new(CursorTracker::new());
        let idx = index.clone();
        let scan = DistinctTermScan::open(
            |from, to| IndexCursor::open(idx, from, to, 1, &tracker),
            KeyOrder::Pos,
            &[],
            None,
        )
        .unwrap();
        let terms: Vec<Iv> = scan.map(|t| t.unwrap()).collect();
        assert_eq!(terms, vec![Iv::uri(3), Iv::uri(5), Iv::uri(9)]);
        // one read per distinct predicate plus the read that finds the end
        assert_eq!(index.range_reads(), 4);
        assert_eq!(tracker.open_cursors(), 0);
    }

    #[test]
    fn test_multi_term_scan_under_known_prefix() {
        let tuples = vec![spo(1, 7, 10), spo(2, 7, 10), spo(1, 7, 11), spo(1, 8, 12)];
        let index = pos_index(&tuples);
        let tracker = Arc::new(CursorTracker::new());
        let scan = DistinctTermScan::open(
            |from, to| IndexCursor::open(index, from, to, 1, &tracker),
            KeyOrder::Pos,
            &[Iv::uri(7)],
            None,
        )
        .unwrap();
        let objects: Vec<Iv> = scan.map(|t| t.unwrap()).collect();
        assert_eq!(objects, vec![Iv::uri(10), Iv::uri(11)]);
    }

    #[test]
    fn test_term_filter() {
        let tuples = vec![spo(1, 2, 3), spo(1, 4, 3), spo(1, 6, 3)];
        let index = pos_index(&tuples);
        let tracker = Arc::new(CursorTracker::new());
        let filter: TermFilter = Arc::new(|iv: &Iv| iv != &Iv::uri(4));
        let scan = DistinctTermScan::open(
            |from, to| IndexCursor::open(index, from, to, 1, &tracker),
            KeyOrder::Pos,
            &[],
            Some(filter),
        )
        .unwrap();
        let terms: Vec<Iv> = scan.map(|t| t.unwrap()).collect();
        assert_eq!(terms, vec![Iv::uri(2), Iv::uri(6)]);
    }

    #[test]
    fn test_too_many_known_terms() {
        let index = pos_index(&[]);
        let tracker = Arc::new(CursorTracker::new());
        let known = [Iv::uri(1), Iv::uri(2), Iv::uri(3)];
        let res = DistinctTermScan::open(
            |from, to| IndexCursor::open(index, from, to, 1, &tracker),
            KeyOrder::Pos,
            &known,
            None,
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_distinct_spo_spills() {
        let records: Vec<Result<StatementRecord>> = (0..30)
            .map(|i| Ok(StatementRecord::explicit(spo(i % 10, 1, 1))))
            .collect();
        let manager: Arc<dyn IndexManager> = Arc::new(MemoryIndexManager::new());
        let mut it = DistinctSpoIter::new(records.into_iter(), false, 4, manager);
        let mut out = Vec::new();
        for r in it.by_ref() {
            out.push(r.unwrap().spo.s);
        }
        assert!(it.has_spilled());
        assert_eq!(out, (0..10).map(Iv::uri).collect::<Vec<_>>());
    }
}
