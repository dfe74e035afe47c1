//! Write-write conflict resolution for isolated relations.
//!
//! [`IsolatedIndex`] is a minimal multi-version store: each transaction reads
//! the snapshot it started on and buffers its writes. At commit, every written
//! key that another transaction committed since the snapshot is handed to the
//! relation's [`ConflictResolver`]. One unresolved key fails the whole commit
//! and nothing is applied.

use crate::error::{RelationError, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One side of a write-write conflict. `value` is `None` for a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TupleVersion<'a> {
    pub key: &'a [u8],
    pub value: Option<&'a [u8]>,
    pub revision: u64,
}

impl TupleVersion<'_> {
    pub fn is_deleted(&self) -> bool {
        self.value.is_none()
    }
}

/// Decides whether a conflicting write may commit.
pub trait ConflictResolver: Send + Sync {
    /// `true` when `tx` can be committed over `current`.
    fn resolve_conflict(&self, tx: &TupleVersion<'_>, current: &TupleVersion<'_>) -> bool;
}

/// Statement write-write resolver.
///
/// Two transactions that both asserted the same tuple agree on its existence,
/// so the later one may commit. Any delete on either side is a real conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpoWriteWriteResolver;

impl ConflictResolver for SpoWriteWriteResolver {
    fn resolve_conflict(&self, tx: &TupleVersion<'_>, current: &TupleVersion<'_>) -> bool {
        !tx.is_deleted() && !current.is_deleted()
    }
}

/// Never resolves anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConflictResolver;

impl ConflictResolver for NoConflictResolver {
    fn resolve_conflict(&self, _tx: &TupleVersion<'_>, _current: &TupleVersion<'_>) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
struct Version {
    value: Option<Vec<u8>>,
    revision: u64,
}

#[derive(Debug, Default)]
struct Ground {
    versions: BTreeMap<Vec<u8>, Vec<Version>>,
    last_commit: u64,
}

impl Ground {
    fn read_at(&self, key: &[u8], revision: u64) -> Option<&Version> {
        self.versions
            .get(key)?
            .iter()
            .rev()
            .find(|v| v.revision <= revision)
    }
}

/// Pending writes against a snapshot
#[derive(Debug)]
pub struct Tx {
    start: u64,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl Tx {
    /// Revision this transaction reads
    pub fn start_revision(&self) -> u64 {
        self.start
    }

    pub fn insert(&mut self, key: &[u8], value: &[u8]) {
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
    }

    pub fn remove(&mut self, key: &[u8]) {
        self.writes.insert(key.to_vec(), None);
    }

    pub fn write_count(&self) -> usize {
        self.writes.len()
    }
}

/// Snapshot-isolated key/value store validated by a [`ConflictResolver`].
pub struct IsolatedIndex {
    name: String,
    ground: RwLock<Ground>,
    resolver: Option<Arc<dyn ConflictResolver>>,
}

impl IsolatedIndex {
    pub fn new(name: impl Into<String>, resolver: Option<Arc<dyn ConflictResolver>>) -> Self {
        Self {
            name: name.into(),
            ground: RwLock::new(Ground::default()),
            resolver,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn last_commit(&self) -> u64 {
        self.ground.read().last_commit
    }

    pub fn begin(&self) -> Tx {
        Tx {
            start: self.last_commit(),
            writes: BTreeMap::new(),
        }
    }

    /// Read through `tx`: its own writes first, then its snapshot.
    pub fn read(&self, tx: &Tx, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(pending) = tx.writes.get(key) {
            return pending.clone();
        }
        self.ground
            .read()
            .read_at(key, tx.start)
            .and_then(|v| v.value.clone())
    }

    /// Validate and apply `tx`, returning its commit revision.
    pub fn commit(&self, tx: Tx) -> Result<u64> {
        let mut ground = self.ground.write();
        for (key, value) in &tx.writes {
            let Some(current) = ground.versions.get(key).and_then(|v| v.last()) else {
                continue;
            };
            if current.revision <= tx.start {
                continue;
            }
            let ours = TupleVersion {
                key,
                value: value.as_deref(),
                revision: tx.start,
            };
            let theirs = TupleVersion {
                key,
                value: current.value.as_deref(),
                revision: current.revision,
            };
            let resolved = self
                .resolver
                .as_ref()
                .is_some_and(|r| r.resolve_conflict(&ours, &theirs));
            if !resolved {
                tracing::debug!(
                    index = %self.name,
                    start = tx.start,
                    committed = current.revision,
                    "write-write conflict"
                );
                return Err(RelationError::conflict(key));
            }
        }

        let revision = ground.last_commit + 1;
        for (key, value) in tx.writes {
            ground
                .versions
                .entry(key)
                .or_default()
                .push(Version { value, revision });
        }
        ground.last_commit = revision;
        Ok(revision)
    }
}

impl fmt::Debug for IsolatedIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolatedIndex")
            .field("name", &self.name)
            .field("last_commit", &self.last_commit())
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}
