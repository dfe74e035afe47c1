//! Shared helpers for quadex-index integration tests.

// Not every test crate uses every helper.
#![allow(dead_code)]

pub mod tracing;

use quadex_core::{Iv, KeyOrder, Spo, SpoPattern, StatementRecord};
use quadex_index::{
    AccessPathOptions, IndexManager, MemoryIndexManager, RelationError, Result, SortedIndex,
    SpoRelation, SpoRelationConfig,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// =============================================================================
// Terms and tuples
// =============================================================================

pub const RDF_TYPE: u64 = 1;

pub fn u(id: u64) -> Iv {
    Iv::uri(id)
}

pub fn triple(s: u64, p: u64, o: u64) -> Spo {
    Spo::triple(u(s), u(p), u(o))
}

pub fn quad(s: u64, p: u64, o: u64, c: u64) -> Spo {
    Spo::quad(u(s), u(p), u(o), Some(u(c)))
}

pub fn explicit(spos: impl IntoIterator<Item = Spo>) -> Vec<StatementRecord> {
    spos.into_iter().map(StatementRecord::explicit).collect()
}

// =============================================================================
// Relations
// =============================================================================

pub fn memory_relation(config: SpoRelationConfig) -> (Arc<MemoryIndexManager>, SpoRelation) {
    let manager = Arc::new(MemoryIndexManager::new());
    let relation = SpoRelation::create(manager.clone(), "kb", config).unwrap();
    (manager, relation)
}

/// Every tuple visible through `key_order`, as a set
pub fn tuples_via(relation: &SpoRelation, key_order: KeyOrder) -> BTreeSet<Spo> {
    relation
        .get_access_path_for(key_order, SpoPattern::wildcard(), AccessPathOptions::new())
        .unwrap()
        .iter()
        .unwrap()
        .map(|r| r.unwrap().spo)
        .collect()
}

/// Tuples matched by `pattern`, in scan order
pub fn scan(relation: &SpoRelation, pattern: SpoPattern) -> Vec<Spo> {
    relation
        .get_access_path(pattern, AccessPathOptions::new())
        .unwrap()
        .to_vec()
        .unwrap()
        .into_iter()
        .map(|r| r.spo)
        .collect()
}

// =============================================================================
// Fault injection
// =============================================================================

/// Index wrapper whose writes can be made to fail.
#[derive(Debug)]
pub struct FlakyIndex {
    inner: Arc<dyn SortedIndex>,
    failing: Arc<AtomicBool>,
}

impl SortedIndex for FlakyIndex {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.lookup(key)
    }

    fn insert(&self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RelationError::index(format!("{} is read-only", self.name())));
        }
        self.inner.insert(key, value)
    }

    fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RelationError::index(format!("{} is read-only", self.name())));
        }
        self.inner.remove(key)
    }

    fn read_range(
        &self,
        from: Option<&[u8]>,
        to: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<quadex_index::Entry>> {
        self.inner.read_range(from, to, limit)
    }

    fn range_count(&self, from: Option<&[u8]>, to: Option<&[u8]>) -> Result<u64> {
        self.inner.range_count(from, to)
    }
}

/// Memory manager that hands out [`FlakyIndex`] for one chosen index name.
#[derive(Debug, Clone)]
pub struct FlakyManager {
    inner: MemoryIndexManager,
    flaky_name: String,
    pub failing: Arc<AtomicBool>,
}

impl FlakyManager {
    pub fn new(flaky_name: &str) -> Self {
        Self {
            inner: MemoryIndexManager::new(),
            flaky_name: flaky_name.to_string(),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn memory(&self) -> &MemoryIndexManager {
        &self.inner
    }

    pub fn fail(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    fn wrap(&self, name: &str, index: Arc<dyn SortedIndex>) -> Arc<dyn SortedIndex> {
        if name == self.flaky_name {
            Arc::new(FlakyIndex {
                inner: index,
                failing: Arc::clone(&self.failing),
            })
        } else {
            index
        }
    }
}

impl IndexManager for FlakyManager {
    fn register_index(&self, name: &str) -> Result<Arc<dyn SortedIndex>> {
        let index = self.inner.register_index(name)?;
        Ok(self.wrap(name, index))
    }

    fn get_index(&self, name: &str) -> Result<Option<Arc<dyn SortedIndex>>> {
        Ok(self.inner.get_index(name)?.map(|i| self.wrap(name, i)))
    }

    fn drop_index(&self, name: &str) -> Result<bool> {
        self.inner.drop_index(name)
    }
}
