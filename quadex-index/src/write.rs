//! Parallel mutation across every index of a relation.
//!
//! One call fans out into one task per configured key order, plus one for the
//! justification index when there is justification work. Tasks run on the
//! relation's bounded rayon pool inside a single scope, so the call returns
//! only after every task has finished.
//!
//! The primary task sorts the caller's slice in place and is the only task
//! that reports: it sets each record's `modified` state and its count is the
//! call's mutation count. Every other task sorts and writes its own clone.
//!
//! When tasks fail, the error from the task that failed first is returned
//! once all tasks are done. Nothing is rolled back.

use crate::access_path::ElementFilter;
use crate::config::SpoRelationConfig;
use crate::error::{RelationError, Result};
use crate::index_set::{IndexHandle, IndexSet};
use crate::justification::{check_tails, JustificationStore};
use quadex_core::{
    Error as CoreError, Iv, Justification, KeyBuilder, Modified, Spo, StatementKind,
    StatementRecord,
};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Cumulative timings for batches above the stats threshold
#[derive(Debug, Default)]
pub struct WriteStats {
    batches: AtomicU64,
    records: AtomicU64,
    sort_nanos: AtomicU64,
    write_nanos: AtomicU64,
}

/// Point-in-time copy of [`WriteStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStatsSnapshot {
    pub batches: u64,
    pub records: u64,
    pub sort_nanos: u64,
    pub write_nanos: u64,
}

impl WriteStats {
    fn record(&self, records: usize, sort: Duration, write: Duration) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.records.fetch_add(records as u64, Ordering::Relaxed);
        self.sort_nanos
            .fetch_add(sort.as_nanos() as u64, Ordering::Relaxed);
        self.write_nanos
            .fetch_add(write.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WriteStatsSnapshot {
        WriteStatsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            sort_nanos: self.sort_nanos.load(Ordering::Relaxed),
            write_nanos: self.write_nanos.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.batches.store(0, Ordering::Relaxed);
        self.records.store(0, Ordering::Relaxed);
        self.sort_nanos.store(0, Ordering::Relaxed);
        self.write_nanos.store(0, Ordering::Relaxed);
    }
}

/// What one task did
#[derive(Debug, Default, Clone, Copy)]
struct TaskOutcome {
    mutations: u64,
    sort: Duration,
    write: Duration,
}

/// A finished task: completion ticket plus result
type TaskSlot = Option<(usize, Result<TaskOutcome>)>;

/// Run `f`, turning a panic into an error and stamping completion order.
fn run_task(
    slot: &mut TaskSlot,
    ticket: &AtomicUsize,
    parent: &tracing::Span,
    f: impl FnOnce() -> Result<TaskOutcome>,
) {
    let _p = parent.enter();
    let result = catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|panic| {
        let msg = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "index task panicked".to_string());
        Err(RelationError::TaskPanicked(msg))
    });
    if let Err(e) = &result {
        tracing::warn!(error = %e, "index task failed");
    }
    *slot = Some((ticket.fetch_add(1, Ordering::AcqRel), result));
}

/// Primary outcome, or the earliest failure across all tasks
fn collect(slots: Vec<TaskSlot>) -> Result<TaskOutcome> {
    let mut primary = None;
    let mut first_err: Option<(usize, RelationError)> = None;
    for (i, slot) in slots.into_iter().enumerate() {
        let Some((ticket, result)) = slot else {
            return Err(RelationError::TaskPanicked("task did not run".into()));
        };
        match result {
            Ok(outcome) if i == 0 => primary = Some(outcome),
            Ok(_) => {}
            Err(e) => {
                if first_err.as_ref().map_or(true, |(t, _)| ticket < *t) {
                    first_err = Some((ticket, e));
                }
            }
        }
    }
    match (first_err, primary) {
        (Some((_, e)), _) => Err(e),
        (None, Some(outcome)) => Ok(outcome),
        (None, None) => Err(RelationError::TaskPanicked("primary task missing".into())),
    }
}

fn sort_for(handle: &IndexHandle, records: &mut [StatementRecord]) -> Duration {
    let start = Instant::now();
    let order = handle.key_order();
    records.par_sort_by(|a, b| order.compare(&a.spo, &b.spo));
    start.elapsed()
}

/// Write `records` into one index.
fn write_index(
    handle: &IndexHandle,
    records: &mut [StatementRecord],
    filter: Option<&dyn ElementFilter>,
    report: bool,
) -> Result<TaskOutcome> {
    let sort = sort_for(handle, records);
    let start = Instant::now();
    let index = handle.index();
    let bloom = handle.bloom();
    let mut kb = KeyBuilder::with_capacity(40);
    let mut mutations = 0;

    for record in records.iter_mut() {
        if filter.is_some_and(|f| !f.is_valid(record)) {
            if report {
                record.set_modified(Modified::None);
            }
            continue;
        }
        let key = handle.key_order().encode_key(&mut kb, &record.spo);
        let existing = match bloom {
            Some(b) if !b.may_contain(&key) => None,
            _ => index.lookup(&key)?,
        };
        let existing_byte = match existing.as_deref() {
            None => None,
            Some([b]) => Some(*b),
            Some(other) => {
                return Err(CoreError::invalid_value(format!(
                    "expected 1 value byte in {}, found {}",
                    index.name(),
                    other.len()
                ))
                .into())
            }
        };
        let modified = match record.resolve_write(existing_byte)? {
            Some((byte, modified)) => {
                index.insert(&key, &[byte])?;
                if let Some(b) = bloom {
                    b.add(&key);
                }
                modified
            }
            None => Modified::None,
        };
        if report {
            record.set_modified(modified);
            if modified.is_modified() {
                mutations += 1;
            }
        }
    }
    Ok(TaskOutcome {
        mutations,
        sort,
        write: start.elapsed(),
    })
}

/// Physically remove `records` from one index.
fn remove_index(
    handle: &IndexHandle,
    records: &mut [StatementRecord],
    report: bool,
) -> Result<TaskOutcome> {
    let sort = sort_for(handle, records);
    let start = Instant::now();
    let index = handle.index();
    let mut kb = KeyBuilder::with_capacity(40);
    let mut mutations = 0;

    for record in records.iter_mut() {
        let key = handle.key_order().encode_key(&mut kb, &record.spo);
        let absent = handle.bloom().is_some_and(|b| !b.may_contain(&key));
        let removed = !absent && index.remove(&key)?.is_some();
        if report {
            if removed {
                record.set_modified(Modified::Removed);
                mutations += 1;
            } else {
                record.set_modified(Modified::None);
            }
        }
    }
    Ok(TaskOutcome {
        mutations,
        sort,
        write: start.elapsed(),
    })
}

/// Reject a tuple the relation's mode cannot store faithfully.
pub(crate) fn check_tuple(config: &SpoRelationConfig, spo: &Spo) -> Result<()> {
    if !config.quads && spo.c.is_some() {
        return Err(CoreError::incompatible(format!("context on triple relation: {spo}")).into());
    }
    let has_sid = [Some(&spo.s), Some(&spo.p), Some(&spo.o), spo.c.as_ref()]
        .into_iter()
        .flatten()
        .any(Iv::is_sid);
    if has_sid && !config.statement_identifiers {
        return Err(CoreError::incompatible(format!(
            "statement identifier without statement identifier support: {spo}"
        ))
        .into());
    }
    Ok(())
}

/// Check every head and tail of `batch` against the relation's mode.
pub(crate) fn check_justifications(
    config: &SpoRelationConfig,
    batch: &[Justification],
) -> Result<()> {
    check_tails(batch)?;
    for j in batch {
        check_tuple(config, &j.head)?;
        j.tail.iter().try_for_each(|t| check_tuple(config, t))?;
    }
    Ok(())
}

/// Fan-out of one mutation call
pub(crate) struct MutationPipeline<'a> {
    pub indices: &'a IndexSet,
    pub config: &'a SpoRelationConfig,
    pub pool: &'a ThreadPool,
    pub stats: &'a WriteStats,
}

impl MutationPipeline<'_> {
    /// Reject records that do not fit the relation's mode.
    fn validate(&self, records: &[StatementRecord]) -> Result<()> {
        records
            .iter()
            .try_for_each(|record| check_tuple(self.config, &record.spo))
    }

    fn handles(&self) -> Result<Vec<IndexHandle>> {
        self.indices
            .key_orders()
            .iter()
            .map(|&k| self.indices.handle(k).cloned())
            .collect()
    }

    fn justification_store(&self) -> Result<Option<JustificationStore>> {
        Ok(self.indices.justification_index()?.map(|index| {
            JustificationStore::new(index.clone(), self.config.quads, self.config.cursor_chunk)
        }))
    }

    fn record_stats(&self, op: &'static str, n: usize, outcome: &TaskOutcome) {
        if n <= self.config.stats_threshold {
            return;
        }
        self.stats.record(n, outcome.sort, outcome.write);
        tracing::info!(
            op,
            records = n,
            mutations = outcome.mutations,
            sort_ms = outcome.sort.as_millis() as u64,
            write_ms = outcome.write.as_millis() as u64,
            "statement batch written"
        );
    }

    /// Insert or update `records` in every index.
    ///
    /// History records are only accepted from the history-delete path.
    pub fn insert(
        &self,
        records: &mut [StatementRecord],
        justifications: Option<&[Justification]>,
        filter: Option<&dyn ElementFilter>,
        allow_history: bool,
    ) -> Result<u64> {
        if !allow_history && records.iter().any(|r| r.kind == StatementKind::History) {
            return Err(RelationError::invalid_input(
                "History records are written by delete, not insert",
            ));
        }
        self.validate(records)?;
        let justifications = justifications.filter(|j| !j.is_empty());
        if let Some(batch) = justifications {
            check_justifications(self.config, batch)?;
        }
        if records.is_empty() && justifications.is_none() {
            return Ok(0);
        }

        let span = tracing::debug_span!(
            "spo_insert",
            records = records.len(),
            indices = self.indices.key_orders().len(),
            threads = self.pool.current_num_threads()
        );
        let _guard = span.enter();

        let handles = self.handles()?;
        let just_store = match justifications {
            Some(_) => Some(self.justification_store()?.ok_or_else(|| {
                RelationError::invalid_input("justifications supplied but justify is off")
            })?),
            None => None,
        };

        let n = records.len();
        let (primary, secondaries) = handles
            .split_first()
            .ok_or_else(|| RelationError::unknown_index("no indices configured"))?;
        let mut clones: Vec<Vec<StatementRecord>> =
            secondaries.iter().map(|_| records.to_vec()).collect();
        let task_count = handles.len() + usize::from(just_store.is_some());
        let mut slots: Vec<TaskSlot> = (0..task_count).map(|_| None).collect();
        let ticket = AtomicUsize::new(0);
        let parent = tracing::Span::current();

        {
            let (primary_slot, rest) = slots.split_at_mut(1);
            let (index_slots, just_slot) = rest.split_at_mut(secondaries.len());
            let ticket = &ticket;
            let parent = &parent;
            self.pool.scope(|scope| {
                let slot = &mut primary_slot[0];
                let records = &mut *records;
                scope.spawn(move |_| {
                    run_task(slot, ticket, parent, || {
                        write_index(primary, records, filter, true)
                    })
                });
                for ((handle, clone), slot) in secondaries
                    .iter()
                    .zip(clones.iter_mut())
                    .zip(index_slots.iter_mut())
                {
                    scope.spawn(move |_| {
                        run_task(slot, ticket, parent, || {
                            write_index(handle, clone, filter, false)
                        })
                    });
                }
                if let (Some(store), Some(batch), Some(slot)) =
                    (just_store.as_ref(), justifications, just_slot.first_mut())
                {
                    scope.spawn(move |_| {
                        run_task(slot, ticket, parent, || {
                            let start = Instant::now();
                            let written = store.add(batch)?;
                            tracing::debug!(written, "justifications written");
                            Ok(TaskOutcome {
                                mutations: 0,
                                sort: Duration::ZERO,
                                write: start.elapsed(),
                            })
                        })
                    });
                }
            });
        }

        let outcome = collect(slots)?;
        self.record_stats("insert", n, &outcome);
        Ok(outcome.mutations)
    }

    /// Remove `records` from every index, or retire them to History.
    pub fn delete(&self, records: &mut [StatementRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        self.validate(records)?;
        if self.config.history {
            return self.retire(records);
        }

        let span = tracing::debug_span!(
            "spo_delete",
            records = records.len(),
            indices = self.indices.key_orders().len(),
            threads = self.pool.current_num_threads()
        );
        let _guard = span.enter();

        let handles = self.handles()?;
        let just_store = self.justification_store()?;

        let n = records.len();
        let (primary, secondaries) = handles
            .split_first()
            .ok_or_else(|| RelationError::unknown_index("no indices configured"))?;
        let mut clones: Vec<Vec<StatementRecord>> =
            secondaries.iter().map(|_| records.to_vec()).collect();
        let heads: Option<Vec<StatementRecord>> = just_store.as_ref().map(|_| records.to_vec());
        let task_count = handles.len() + usize::from(just_store.is_some());
        let mut slots: Vec<TaskSlot> = (0..task_count).map(|_| None).collect();
        let ticket = AtomicUsize::new(0);
        let parent = tracing::Span::current();

        {
            let (primary_slot, rest) = slots.split_at_mut(1);
            let (index_slots, just_slot) = rest.split_at_mut(secondaries.len());
            let ticket = &ticket;
            let parent = &parent;
            self.pool.scope(|scope| {
                let slot = &mut primary_slot[0];
                let records = &mut *records;
                scope.spawn(move |_| {
                    run_task(slot, ticket, parent, || remove_index(primary, records, true))
                });
                for ((handle, clone), slot) in secondaries
                    .iter()
                    .zip(clones.iter_mut())
                    .zip(index_slots.iter_mut())
                {
                    scope.spawn(move |_| {
                        run_task(slot, ticket, parent, || remove_index(handle, clone, false))
                    });
                }
                if let (Some(store), Some(heads), Some(slot)) =
                    (just_store.as_ref(), heads.as_deref(), just_slot.first_mut())
                {
                    scope.spawn(move |_| {
                        run_task(slot, ticket, parent, || {
                            let start = Instant::now();
                            let removed = store.cascade_delete(heads)?;
                            tracing::debug!(removed, "justifications removed");
                            Ok(TaskOutcome {
                                mutations: 0,
                                sort: Duration::ZERO,
                                write: start.elapsed(),
                            })
                        })
                    });
                }
            });
        }

        let outcome = collect(slots)?;
        self.record_stats("delete", n, &outcome);
        Ok(outcome.mutations)
    }

    /// History delete: rewrite each record as History and copy back
    /// `modified`.
    fn retire(&self, records: &mut [StatementRecord]) -> Result<u64> {
        let primary = self.indices.primary_key_order();
        records.sort_by(|a, b| primary.compare(&a.spo, &b.spo));
        let mut history: Vec<StatementRecord> = records
            .iter()
            .map(|r| {
                StatementRecord::new(r.spo.clone(), StatementKind::History)
                    .with_user_flag(r.user_flag)
                    .with_statement_identifier(r.statement_identifier)
            })
            .collect();
        let mutations = self.insert(&mut history, None, None, true)?;
        for (record, retired) in records.iter_mut().zip(&history) {
            record.set_modified(retired.modified());
        }
        Ok(mutations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_prefers_earliest_failure() {
        let slots: Vec<TaskSlot> = vec![
            Some((2, Ok(TaskOutcome::default()))),
            Some((1, Err(RelationError::index("second")))),
            Some((0, Err(RelationError::index("first")))),
        ];
        match collect(slots) {
            Err(RelationError::Index(msg)) => assert_eq!(msg, "first"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_collect_returns_primary_outcome() {
        let slots: Vec<TaskSlot> = vec![
            Some((1, Ok(TaskOutcome { mutations: 3, ..Default::default() }))),
            Some((0, Ok(TaskOutcome { mutations: 9, ..Default::default() }))),
        ];
        assert_eq!(collect(slots).unwrap().mutations, 3);
    }

    #[test]
    fn test_run_task_captures_panic() {
        let ticket = AtomicUsize::new(0);
        let mut slot: TaskSlot = None;
        run_task(&mut slot, &ticket, &tracing::Span::none(), || panic!("boom"));
        match slot {
            Some((0, Err(RelationError::TaskPanicked(msg)))) => assert_eq!(msg, "boom"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_write_stats_snapshot_and_reset() {
        let stats = WriteStats::default();
        stats.record(5000, Duration::from_nanos(10), Duration::from_nanos(30));
        let snap = stats.snapshot();
        assert_eq!(snap.batches, 1);
        assert_eq!(snap.records, 5000);
        assert_eq!(snap.sort_nanos, 10);
        assert_eq!(snap.write_nanos, 30);
        stats.reset();
        assert_eq!(stats.snapshot(), WriteStatsSnapshot::default());
    }
}
