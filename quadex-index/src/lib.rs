//! # Quadex Index
//!
//! Statement indices for an RDF store.
//!
//! A relation keeps every triple (or quad) in several sorted indices, one per
//! key order, so that any access pattern is a prefix scan on one of them.
//! This crate provides:
//!
//! - [`SpoRelation`]: lifecycle, parallel insert and delete, access paths,
//!   distinct scans, justifications and diagnostics
//! - [`AccessPath`]: a bounded, lazily read view over the best index for a
//!   pattern
//! - [`SortedIndex`] / [`IndexManager`]: the storage seam, with in-memory
//!   implementations
//! - [`BloomFilterGuard`]: fast negative point tests on the primary index
//! - [`ConflictResolver`]: write-write validation for isolated transactions
//!
//! Identifiers, tuples, key orders and key encoding live in `quadex_core`.

pub mod access_path;
pub mod bloom;
pub mod config;
pub mod conflict;
pub mod cursor;
pub mod distinct;
pub mod error;
pub mod index_set;
pub mod justification;
pub mod relation;
pub mod storage;
pub mod write;

pub use access_path::{AccessPath, AccessPathOptions, ElementFilter, StatementIter};
pub use bloom::{BloomFilter, BloomFilterGuard, BloomFilterStats};
pub use config::{BloomFilterConfig, SpoRelationConfig};
pub use conflict::{
    ConflictResolver, IsolatedIndex, NoConflictResolver, SpoWriteWriteResolver, TupleVersion, Tx,
};
pub use cursor::{CursorTracker, IndexCursor};
pub use distinct::{DistinctSpoIter, DistinctTermScan, TermFilter};
pub use error::{RelationError, Result};
pub use index_set::{IndexHandle, IndexSet};
pub use justification::JustificationStore;
pub use relation::SpoRelation;
pub use storage::{Entry, IndexManager, MemoryIndex, MemoryIndexManager, SortedIndex};
pub use write::{WriteStats, WriteStatsSnapshot};
