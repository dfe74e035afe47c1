//! Sorted index traits and an in-memory implementation
//!
//! The relation never sees the physical index. It consumes an opaque sorted
//! map from byte keys to byte values through [`SortedIndex`], and resolves
//! named indices through an [`IndexManager`].
//!
//! ## Implementations
//!
//! - [`MemoryIndex`] / [`MemoryIndexManager`]: `BTreeMap` behind a
//!   `parking_lot::RwLock`, used for tests, temporary indices and embedded use
//!
//! Persistent B+Tree backends implement the same traits.

use crate::error::{RelationError, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A key/value pair read from an index
pub type Entry = (Vec<u8>, Vec<u8>);

/// Ordered byte-keyed map.
///
/// Keys compare as unsigned bytes, lexicographically. Implementations must be
/// safe for concurrent readers and serialize their own writers.
pub trait SortedIndex: Debug + Send + Sync {
    /// Index name as registered with its manager
    fn name(&self) -> &str;

    /// Point lookup
    fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Whether `key` is present
    fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.lookup(key)?.is_some())
    }

    /// Insert or replace, returning the previous value
    fn insert(&self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Remove, returning the previous value
    fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Up to `limit` entries with `from <= key < to`, ascending.
    ///
    /// `None` bounds are open.
    fn read_range(&self, from: Option<&[u8]>, to: Option<&[u8]>, limit: usize)
        -> Result<Vec<Entry>>;

    /// Exact number of entries with `from <= key < to`
    fn range_count(&self, from: Option<&[u8]>, to: Option<&[u8]>) -> Result<u64>;

    /// Total number of entries
    fn entry_count(&self) -> Result<u64> {
        self.range_count(None, None)
    }
}

/// Registry of named sorted indices.
pub trait IndexManager: Debug + Send + Sync {
    /// Create a new, empty index. Fails if the name is taken.
    fn register_index(&self, name: &str) -> Result<Arc<dyn SortedIndex>>;

    /// Resolve a registered index
    fn get_index(&self, name: &str) -> Result<Option<Arc<dyn SortedIndex>>>;

    /// Drop an index; returns whether it existed
    fn drop_index(&self, name: &str) -> Result<bool>;

    /// An unregistered scratch index, discarded when the last handle drops
    fn temp_index(&self) -> Result<Arc<dyn SortedIndex>> {
        Ok(Arc::new(MemoryIndex::new("temp")))
    }
}

/// In-memory sorted index.
#[derive(Debug)]
pub struct MemoryIndex {
    name: String,
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    range_reads: AtomicU64,
}

impl MemoryIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: RwLock::new(BTreeMap::new()),
            range_reads: AtomicU64::new(0),
        }
    }

    /// Number of `read_range` calls served so far
    pub fn range_reads(&self) -> u64 {
        self.range_reads.load(Ordering::Relaxed)
    }

    /// Snapshot of every key, ascending
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.data.read().keys().cloned().collect()
    }
}

type ByteRange<'a> = (Bound<&'a [u8]>, Bound<&'a [u8]>);

fn bounds<'a>(from: Option<&'a [u8]>, to: Option<&'a [u8]>) -> Option<ByteRange<'a>> {
    if let (Some(f), Some(t)) = (from, to) {
        if f >= t {
            return None;
        }
    }
    Some((
        from.map_or(Bound::Unbounded, Bound::Included),
        to.map_or(Bound::Unbounded, Bound::Excluded),
    ))
}

impl SortedIndex for MemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.data.read().contains_key(key))
    }

    fn insert(&self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.write().insert(key.to_vec(), value.to_vec()))
    }

    fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.write().remove(key))
    }

    fn read_range(
        &self,
        from: Option<&[u8]>,
        to: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<Entry>> {
        self.range_reads.fetch_add(1, Ordering::Relaxed);
        let Some(range) = bounds(from, to) else {
            return Ok(Vec::new());
        };
        let data = self.data.read();
        Ok(data
            .range::<[u8], _>(range)
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn range_count(&self, from: Option<&[u8]>, to: Option<&[u8]>) -> Result<u64> {
        let Some(range) = bounds(from, to) else {
            return Ok(0);
        };
        Ok(self.data.read().range::<[u8], _>(range).count() as u64)
    }

    fn entry_count(&self) -> Result<u64> {
        Ok(self.data.read().len() as u64)
    }
}

/// In-memory index manager.
#[derive(Debug, Default, Clone)]
pub struct MemoryIndexManager {
    indices: Arc<RwLock<HashMap<String, Arc<MemoryIndex>>>>,
}

impl MemoryIndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete handle to a registered index, for inspection
    pub fn memory_index(&self, name: &str) -> Option<Arc<MemoryIndex>> {
        self.indices.read().get(name).cloned()
    }

    /// Registered index names, sorted
    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl IndexManager for MemoryIndexManager {
    fn register_index(&self, name: &str) -> Result<Arc<dyn SortedIndex>> {
        let mut indices = self.indices.write();
        if indices.contains_key(name) {
            return Err(RelationError::AlreadyExists(name.to_string()));
        }
        let index = Arc::new(MemoryIndex::new(name));
        indices.insert(name.to_string(), Arc::clone(&index));
        Ok(index)
    }

    fn get_index(&self, name: &str) -> Result<Option<Arc<dyn SortedIndex>>> {
        Ok(self
            .indices
            .read()
            .get(name)
            .map(|i| Arc::clone(i) as Arc<dyn SortedIndex>))
    }

    fn drop_index(&self, name: &str) -> Result<bool> {
        Ok(self.indices.write().remove(name).is_some())
    }
}
