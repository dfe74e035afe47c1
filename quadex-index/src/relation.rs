//! The statement relation: a set of permuted indices kept in agreement.
//!
//! [`SpoRelation`] is the entry point for the ingest and query layers. It owns
//! the [`IndexSet`], the bounded write pool and the write statistics, and
//! exposes mutation, access paths, distinct scans, justifications and
//! diagnostics over them.

use crate::access_path::{AccessPath, AccessPathOptions, ElementFilter};
use crate::bloom::BloomFilterStats;
use crate::config::SpoRelationConfig;
use crate::conflict::{ConflictResolver, SpoWriteWriteResolver};
use crate::cursor::IndexCursor;
use crate::distinct::{DistinctSpoIter, DistinctTermScan, TermFilter};
use crate::error::{RelationError, Result};
use crate::index_set::IndexSet;
use crate::justification::JustificationStore;
use crate::storage::IndexManager;
use crate::write::{
    check_justifications, check_tuple, MutationPipeline, WriteStats, WriteStatsSnapshot,
};
use quadex_core::{
    Iv, Justification, KeyBuilder, KeyOrder, Spo, SpoPattern, StatementKind, StatementRecord,
    StatementValue,
};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fmt::{self, Write as _};
use std::sync::Arc;

pub struct SpoRelation {
    manager: Arc<dyn IndexManager>,
    config: SpoRelationConfig,
    indices: IndexSet,
    pool: ThreadPool,
    stats: WriteStats,
}

impl SpoRelation {
    fn build(
        manager: Arc<dyn IndexManager>,
        namespace: &str,
        config: SpoRelationConfig,
    ) -> Result<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.write_threads)
            .thread_name(|i| format!("quadex-write-{i}"))
            .build()
            .map_err(|e| RelationError::index(format!("write pool: {e}")))?;
        let indices = IndexSet::new(Arc::clone(&manager), namespace, &config);
        Ok(Self {
            manager,
            config,
            indices,
            pool,
            stats: WriteStats::default(),
        })
    }

    /// Register every index for `namespace` and return the relation.
    pub fn create(
        manager: Arc<dyn IndexManager>,
        namespace: &str,
        config: SpoRelationConfig,
    ) -> Result<Self> {
        let relation = Self::build(manager, namespace, config)?;
        relation.indices.create_all()?;
        tracing::info!(
            namespace,
            key_orders = ?relation.indices.key_orders(),
            justify = relation.config.justify,
            "created statement relation"
        );
        Ok(relation)
    }

    /// Attach to the indices of an existing relation.
    pub fn open(
        manager: Arc<dyn IndexManager>,
        namespace: &str,
        config: SpoRelationConfig,
    ) -> Result<Self> {
        let relation = Self::build(manager, namespace, config)?;
        if !relation.indices.all_exist()? {
            return Err(RelationError::unknown_index(format!(
                "relation {namespace} is missing one or more indices"
            )));
        }
        // the primary index already holds data; an empty filter would hide it
        if let Some(stats) = relation.rebuild_bloom_filter()? {
            tracing::debug!(
                namespace,
                keys = stats.keys_added,
                enabled = stats.enabled,
                "loaded bloom filter from primary index"
            );
        }
        Ok(relation)
    }

    /// Whether every index the configuration calls for is registered.
    pub fn exists(
        manager: Arc<dyn IndexManager>,
        namespace: &str,
        config: &SpoRelationConfig,
    ) -> Result<bool> {
        IndexSet::new(manager, namespace, config).all_exist()
    }

    /// Drop every index of this relation.
    pub fn destroy(self) -> Result<()> {
        self.indices.drop_all()?;
        tracing::info!(namespace = self.indices.namespace(), "destroyed statement relation");
        Ok(())
    }

    pub fn namespace(&self) -> &str {
        self.indices.namespace()
    }

    pub fn config(&self) -> &SpoRelationConfig {
        &self.config
    }

    /// Maintained key orders, primary first
    pub fn key_orders(&self) -> &[KeyOrder] {
        self.indices.key_orders()
    }

    pub fn primary_key_order(&self) -> KeyOrder {
        self.indices.primary_key_order()
    }

    pub fn key_arity(&self) -> usize {
        self.config.key_arity()
    }

    pub fn is_quads(&self) -> bool {
        self.config.quads
    }

    pub fn index_manager(&self) -> &Arc<dyn IndexManager> {
        &self.manager
    }

    fn pipeline(&self) -> MutationPipeline<'_> {
        MutationPipeline {
            indices: &self.indices,
            config: &self.config,
            pool: &self.pool,
            stats: &self.stats,
        }
    }

    // === Mutation ===

    /// Write `records` to every index.
    ///
    /// The slice is reordered into primary key order and each record's
    /// `modified` state is set from the primary index. Returns the number of
    /// records that changed the primary index.
    pub fn insert(&self, records: &mut [StatementRecord]) -> Result<u64> {
        self.pipeline().insert(records, None, None, false)
    }

    /// [`insert`](Self::insert), skipping records `filter` rejects.
    pub fn insert_filtered(
        &self,
        records: &mut [StatementRecord],
        filter: &dyn ElementFilter,
    ) -> Result<u64> {
        self.pipeline().insert(records, None, Some(filter), false)
    }

    /// [`insert`](Self::insert) plus the justifications that ground them,
    /// written by one more parallel task.
    pub fn insert_justified(
        &self,
        records: &mut [StatementRecord],
        justifications: &[Justification],
    ) -> Result<u64> {
        if !self.config.justify {
            return Err(RelationError::invalid_input(
                "justifications supplied but justify is off",
            ));
        }
        self.pipeline()
            .insert(records, Some(justifications), None, false)
    }

    /// Remove `records`, or retire them as History when history is kept.
    ///
    /// Justifications headed by a removed record are deleted with it.
    pub fn delete(&self, records: &mut [StatementRecord]) -> Result<u64> {
        self.pipeline().delete(records)
    }

    // === Justifications ===

    fn justification_store(&self) -> Result<JustificationStore> {
        let index = self.indices.justification_index()?.ok_or_else(|| {
            RelationError::invalid_input(format!(
                "relation {} does not keep justifications",
                self.namespace()
            ))
        })?;
        Ok(JustificationStore::new(
            Arc::clone(index),
            self.config.quads,
            self.config.cursor_chunk,
        ))
    }

    /// Store justifications not already present; returns how many were new.
    pub fn add_justifications(&self, batch: &[Justification]) -> Result<u64> {
        let store = self.justification_store()?;
        check_justifications(&self.config, batch)?;
        store.add(batch)
    }

    pub fn justifications_for(&self, head: &Spo) -> Result<Vec<Justification>> {
        self.justification_store()?.justifications_for(head)
    }

    pub fn justification_count(&self) -> Result<u64> {
        self.justification_store()?.len()
    }

    // === Reads ===

    /// Access path for `pattern` over the best maintained index.
    pub fn get_access_path(
        &self,
        pattern: SpoPattern,
        options: AccessPathOptions,
    ) -> Result<AccessPath> {
        AccessPath::new(&self.indices, &self.config, pattern, options)
    }

    /// Access path for `pattern` over a specific key order.
    pub fn get_access_path_for(
        &self,
        key_order: KeyOrder,
        pattern: SpoPattern,
        options: AccessPathOptions,
    ) -> Result<AccessPath> {
        AccessPath::for_key_order(&self.indices, &self.config, key_order, pattern, options)
    }

    /// The stored record for `spo`, History markers included.
    pub fn get(&self, spo: &Spo) -> Result<Option<StatementRecord>> {
        check_tuple(&self.config, spo)?;
        let primary = self.indices.primary()?;
        let mut kb = KeyBuilder::with_capacity(40);
        let key = primary.key_order().encode_key(&mut kb, spo);
        if primary.bloom().is_some_and(|b| !b.may_contain(&key)) {
            return Ok(None);
        }
        let Some(value) = primary.index().lookup(&key)? else {
            return Ok(None);
        };
        let value = StatementValue::from_bytes(&value)?;
        Ok(Some(StatementRecord::from_stored(spo.clone(), value)))
    }

    /// Whether `spo` is stored as a live statement.
    pub fn contains(&self, spo: &Spo) -> Result<bool> {
        Ok(self
            .get(spo)?
            .is_some_and(|r| r.kind != StatementKind::History))
    }

    // === Distinct scans ===

    fn distinct_scan(
        &self,
        key_order: KeyOrder,
        known: &[Iv],
        filter: Option<TermFilter>,
    ) -> Result<DistinctTermScan> {
        let handle = self.indices.handle(key_order)?;
        let index = Arc::clone(handle.index());
        let tracker = self.indices.cursor_tracker();
        // one entry per read: every entry is followed by a seek
        DistinctTermScan::open(
            |from, to| IndexCursor::open(index, from, to, 1, tracker),
            key_order,
            known,
            filter,
        )
    }

    /// Each distinct value of `key_order`'s first component, ascending.
    pub fn distinct_term_scan(
        &self,
        key_order: KeyOrder,
        filter: Option<TermFilter>,
    ) -> Result<DistinctTermScan> {
        self.distinct_scan(key_order, &[], filter)
    }

    /// Each distinct value of the component following `known`, ascending.
    pub fn distinct_multi_term_scan(
        &self,
        key_order: KeyOrder,
        known: &[Iv],
        filter: Option<TermFilter>,
    ) -> Result<DistinctTermScan> {
        self.distinct_scan(key_order, known, filter)
    }

    /// Drop duplicate tuples from `source`, first occurrence wins.
    pub fn distinct_tuple_scan<I>(&self, source: I) -> DistinctSpoIter<I::IntoIter>
    where
        I: IntoIterator<Item = Result<StatementRecord>>,
    {
        DistinctSpoIter::new(
            source.into_iter(),
            self.config.quads,
            self.config.distinct_spill_threshold,
            Arc::clone(&self.manager),
        )
    }

    // === Diagnostics ===

    /// Every record in `key_order`, one per line, History included.
    pub fn dump(&self, key_order: KeyOrder) -> Result<String> {
        let path = self.get_access_path_for(
            key_order,
            SpoPattern::wildcard(),
            AccessPathOptions::new().with_history(true),
        )?;
        let mut out = String::new();
        let mut n = 0u64;
        for record in path.iter()? {
            let _ = writeln!(out, "{}", record?);
            n += 1;
        }
        let _ = writeln!(out, "{}: {} statements", self.indices.index_name(key_order), n);
        Ok(out)
    }

    pub fn write_stats(&self) -> WriteStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn reset_write_stats(&self) {
        self.stats.reset();
    }

    /// Primary bloom filter statistics, `None` without a bloom filter
    pub fn bloom_stats(&self) -> Option<BloomFilterStats> {
        self.indices.bloom().map(|b| b.stats())
    }

    /// Rebuild the primary bloom filter from the primary index.
    pub fn rebuild_bloom_filter(&self) -> Result<Option<BloomFilterStats>> {
        let Some(bloom) = self.indices.bloom() else {
            return Ok(None);
        };
        let primary = self.indices.primary()?;
        bloom
            .rebuild(primary.index().as_ref(), self.config.cursor_chunk)
            .map(Some)
    }

    /// Cursors currently open against this relation
    pub fn open_cursors(&self) -> usize {
        self.indices.cursor_tracker().open_cursors()
    }

    /// Write-write resolver for isolated, non-inferencing relations.
    pub fn conflict_resolver(&self) -> Option<Arc<dyn ConflictResolver>> {
        self.config
            .resolves_conflicts()
            .then(|| Arc::new(SpoWriteWriteResolver) as Arc<dyn ConflictResolver>)
    }
}

impl fmt::Debug for SpoRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpoRelation")
            .field("namespace", &self.namespace())
            .field("key_orders", &self.key_orders())
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}
