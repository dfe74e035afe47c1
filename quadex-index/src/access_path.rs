//! Access paths: one chosen index, bounded by a pattern, read lazily.
//!
//! Building an access path selects a key order for the pattern, derives the
//! `[from_key, to_key)` bounds from the pattern's bound prefix, and resolves
//! the index handle. Nothing is read until [`AccessPath::iter`] opens a
//! cursor. Each call to `iter` is a fresh scan.
//!
//! Tuples outside the bound prefix (fallback orders, object ranges that do
//! not line up with the key) are filtered after decoding, so every path
//! yields exactly the tuples matching its pattern.

use crate::config::SpoRelationConfig;
use crate::cursor::{CursorTracker, IndexCursor};
use crate::error::Result;
use crate::index_set::{IndexHandle, IndexSet};
use quadex_core::{
    Error as CoreError, Iv, KeyBuilder, KeyOrder, ObjectRange, Position, Slot, Spo, SpoPattern,
    StatementKind, StatementRecord, StatementValue,
};
use std::fmt;
use std::sync::Arc;

/// Accepts or rejects records visited by an access path
pub trait ElementFilter: Send + Sync {
    fn is_valid(&self, record: &StatementRecord) -> bool;
}

impl<F> ElementFilter for F
where
    F: Fn(&StatementRecord) -> bool + Send + Sync,
{
    fn is_valid(&self, record: &StatementRecord) -> bool {
        self(record)
    }
}

/// Optional knobs for [`AccessPath`] construction
#[derive(Clone, Default)]
pub struct AccessPathOptions {
    pub filter: Option<Arc<dyn ElementFilter>>,
    pub range: Option<ObjectRange>,
    /// Preferred order for a fully bound pattern
    pub locality_hint: Option<KeyOrder>,
    /// Also visit History records (history relations only)
    pub include_history: bool,
}

impl AccessPathOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: impl ElementFilter + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn with_range(mut self, range: ObjectRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_locality_hint(mut self, key_order: KeyOrder) -> Self {
        self.locality_hint = Some(key_order);
        self
    }

    pub fn with_history(mut self, include: bool) -> Self {
        self.include_history = include;
        self
    }
}

impl fmt::Debug for AccessPathOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPathOptions")
            .field("filter", &self.filter.is_some())
            .field("range", &self.range)
            .field("locality_hint", &self.locality_hint)
            .field("include_history", &self.include_history)
            .finish()
    }
}

#[derive(Debug, Clone)]
enum Source {
    Index(IndexHandle),
    /// Answered from an inline statement identifier, no index I/O
    Inline(Option<StatementRecord>),
}

/// Residual checks applied to every decoded record
#[derive(Clone)]
struct RecordTest {
    pattern: SpoPattern,
    range: Option<ObjectRange>,
    filter: Option<Arc<dyn ElementFilter>>,
    hide_history: bool,
}

impl RecordTest {
    fn accepts(&self, record: &StatementRecord) -> bool {
        if self.hide_history && record.kind == StatementKind::History {
            return false;
        }
        if !self.pattern.matches(&record.spo) {
            return false;
        }
        if let Some(range) = &self.range {
            if !self.pattern.o.is_bound() && !range.contains(&record.spo.o) {
                return false;
            }
        }
        self.filter.as_ref().map_or(true, |f| f.is_valid(record))
    }

    /// Whether key bounds alone select exactly the accepted records
    fn is_trivial(&self, key_order: KeyOrder) -> bool {
        let bound = [Position::S, Position::P, Position::O, Position::C]
            .into_iter()
            .filter(|&p| self.pattern.slot(p).is_bound())
            .count();
        !self.hide_history
            && self.filter.is_none()
            && self.range.is_none()
            && key_order.bound_prefix_len(&self.pattern) == bound
    }
}

/// A resolved, bounded view over one index.
pub struct AccessPath {
    key_order: KeyOrder,
    from_key: Option<Vec<u8>>,
    to_key: Option<Vec<u8>>,
    source: Source,
    test: RecordTest,
    chunk: usize,
    tracker: Arc<CursorTracker>,
}

impl AccessPath {
    /// Access path for `pattern`, selecting the key order.
    pub(crate) fn new(
        indices: &IndexSet,
        config: &SpoRelationConfig,
        pattern: SpoPattern,
        options: AccessPathOptions,
    ) -> Result<Self> {
        if let Some(hint) = options.locality_hint {
            hint.ensure_mode(config.quads)?;
        }
        if let Slot::Bound(c) = &pattern.c {
            if !config.quads {
                if !config.statement_identifiers {
                    return Err(CoreError::incompatible(
                        "context bound on a triple relation without statement identifiers",
                    )
                    .into());
                }
                return Ok(Self::inline(indices, config, &pattern, c, options));
            }
        }

        let mut key_order =
            KeyOrder::select_with_hint(&pattern, config.quads, options.locality_hint);
        if !indices.is_configured(key_order) {
            tracing::debug!(
                selected = %key_order,
                pattern = %pattern,
                "key order not maintained, reading primary index"
            );
            key_order = indices.primary_key_order();
        }
        Self::build(indices, config, key_order, pattern, options)
    }

    /// Access path over an explicitly chosen key order.
    pub(crate) fn for_key_order(
        indices: &IndexSet,
        config: &SpoRelationConfig,
        key_order: KeyOrder,
        pattern: SpoPattern,
        options: AccessPathOptions,
    ) -> Result<Self> {
        key_order.ensure_mode(config.quads)?;
        if !config.quads && pattern.c.is_bound() {
            return Err(
                CoreError::incompatible("context bound on a triple-mode key order").into(),
            );
        }
        Self::build(indices, config, key_order, pattern, options)
    }

    fn build(
        indices: &IndexSet,
        config: &SpoRelationConfig,
        key_order: KeyOrder,
        pattern: SpoPattern,
        options: AccessPathOptions,
    ) -> Result<Self> {
        let handle = indices.handle(key_order)?.clone();
        let mut kb = KeyBuilder::with_capacity(40);
        let from_key = key_order.from_key(&mut kb, &pattern, options.range.as_ref());
        let to_key = key_order.to_key(&mut kb, &pattern, options.range.as_ref())?;
        Ok(Self {
            key_order,
            from_key,
            to_key,
            source: Source::Index(handle),
            test: RecordTest {
                pattern,
                range: options.range,
                filter: options.filter,
                hide_history: config.history && !options.include_history,
            },
            chunk: config.cursor_chunk,
            tracker: Arc::clone(indices.cursor_tracker()),
        })
    }

    /// Answer a pattern whose context is an inline statement identifier.
    ///
    /// The identifier carries the whole triple, so the answer is that triple
    /// when it agrees with the other bound slots, and nothing otherwise.
    fn inline(
        indices: &IndexSet,
        config: &SpoRelationConfig,
        pattern: &SpoPattern,
        c: &Iv,
        options: AccessPathOptions,
    ) -> Self {
        let record = match c.as_sid() {
            Some(spo) => {
                let probe = SpoPattern {
                    c: Slot::Unbound,
                    ..pattern.clone()
                };
                probe.matches(spo).then(|| {
                    StatementRecord::explicit(Spo::clone(spo)).with_statement_identifier(true)
                })
            }
            None => None,
        };
        tracing::debug!(
            pattern = %pattern,
            matched = record.is_some(),
            "answered from inline statement identifier"
        );
        Self {
            key_order: indices.primary_key_order(),
            from_key: None,
            to_key: None,
            source: Source::Inline(record),
            test: RecordTest {
                pattern: SpoPattern {
                    c: Slot::Unbound,
                    ..pattern.clone()
                },
                range: options.range,
                filter: options.filter,
                hide_history: config.history && !options.include_history,
            },
            chunk: config.cursor_chunk,
            tracker: Arc::clone(indices.cursor_tracker()),
        }
    }

    #[inline]
    pub fn key_order(&self) -> KeyOrder {
        self.key_order
    }

    pub fn pattern(&self) -> &SpoPattern {
        &self.test.pattern
    }

    /// Inclusive lower bound, `None` when open
    pub fn from_key(&self) -> Option<&[u8]> {
        self.from_key.as_deref()
    }

    /// Exclusive upper bound, `None` when open
    pub fn to_key(&self) -> Option<&[u8]> {
        self.to_key.as_deref()
    }

    /// Whether this path is answered without touching an index
    pub fn is_inline(&self) -> bool {
        matches!(self.source, Source::Inline(_))
    }

    /// Open a new scan.
    pub fn iter(&self) -> Result<StatementIter> {
        let inner = match &self.source {
            Source::Inline(record) => Inner::Inline(record.clone()),
            Source::Index(handle) => Inner::Cursor(IndexCursor::open(
                Arc::clone(handle.index()),
                self.from_key.clone(),
                self.to_key.clone(),
                self.chunk,
                &self.tracker,
            )),
        };
        Ok(StatementIter {
            inner,
            key_order: self.key_order,
            test: self.test.clone(),
        })
    }

    /// Exact number of records this path yields.
    pub fn range_count(&self) -> Result<u64> {
        match &self.source {
            Source::Index(handle) if self.test.is_trivial(self.key_order) => handle
                .index()
                .range_count(self.from_key.as_deref(), self.to_key.as_deref()),
            _ => {
                let mut n = 0;
                for record in self.iter()? {
                    record?;
                    n += 1;
                }
                Ok(n)
            }
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        let mut it = self.iter()?;
        let first = it.next().transpose()?;
        it.close();
        Ok(first.is_none())
    }

    /// Collect every record.
    pub fn to_vec(&self) -> Result<Vec<StatementRecord>> {
        self.iter()?.collect()
    }
}

impl fmt::Debug for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPath")
            .field("key_order", &self.key_order)
            .field("pattern", &self.test.pattern)
            .field("inline", &self.is_inline())
            .finish()
    }
}

enum Inner {
    Cursor(IndexCursor),
    Inline(Option<StatementRecord>),
}

/// Lazy, ordered records from one scan.
///
/// Holds an index cursor until it is exhausted, closed or dropped.
pub struct StatementIter {
    inner: Inner,
    key_order: KeyOrder,
    test: RecordTest,
}

impl StatementIter {
    /// Release the underlying cursor.
    pub fn close(&mut self) {
        match &mut self.inner {
            Inner::Cursor(cursor) => cursor.close(),
            Inner::Inline(record) => *record = None,
        }
    }

    fn decode(&self, key: &[u8], value: &[u8]) -> Result<StatementRecord> {
        let spo = self.key_order.decode_key(key)?;
        let value = StatementValue::from_bytes(value)?;
        Ok(StatementRecord::from_stored(spo, value))
    }

    fn next_record(&mut self) -> Result<Option<StatementRecord>> {
        loop {
            let entry = match &mut self.inner {
                Inner::Inline(record) => {
                    return Ok(record.take().filter(|r| self.test.accepts(r)));
                }
                Inner::Cursor(cursor) => cursor.next_entry()?,
            };
            let Some((key, value)) = entry else {
                return Ok(None);
            };
            let record = match self.decode(&key, &value) {
                Ok(r) => r,
                Err(e) => {
                    self.close();
                    return Err(e);
                }
            };
            if self.test.accepts(&record) {
                return Ok(Some(record));
            }
        }
    }
}

impl Iterator for StatementIter {
    type Item = Result<StatementRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

impl fmt::Debug for StatementIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementIter")
            .field("key_order", &self.key_order)
            .finish()
    }
}
