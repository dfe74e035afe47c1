//! Chunked, seekable cursors over a [`SortedIndex`].
//!
//! A cursor pulls `chunk` entries at a time from the index and hands them out
//! one by one. Every open cursor is counted by a [`CursorTracker`]; the count
//! drops when the cursor is closed, runs to its end, fails, or is dropped.

use crate::error::Result;
use crate::storage::{Entry, SortedIndex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts cursors opened against a relation's indices
#[derive(Debug, Default)]
pub struct CursorTracker {
    open: AtomicUsize,
    opened: AtomicU64,
}

impl CursorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursors currently holding index resources
    pub fn open_cursors(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }

    /// Cursors opened over the tracker's lifetime
    pub fn total_opened(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }
}

struct CursorGuard(Arc<CursorTracker>);

impl CursorGuard {
    fn acquire(tracker: &Arc<CursorTracker>) -> Self {
        tracker.open.fetch_add(1, Ordering::AcqRel);
        tracker.opened.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(tracker))
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        self.0.open.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Forward cursor over `[from, to)`.
pub struct IndexCursor {
    index: Arc<dyn SortedIndex>,
    from: Option<Vec<u8>>,
    next_from: Option<Vec<u8>>,
    to: Option<Vec<u8>>,
    chunk: usize,
    buf: VecDeque<Entry>,
    exhausted: bool,
    guard: Option<CursorGuard>,
}

impl IndexCursor {
    pub fn open(
        index: Arc<dyn SortedIndex>,
        from: Option<Vec<u8>>,
        to: Option<Vec<u8>>,
        chunk: usize,
        tracker: &Arc<CursorTracker>,
    ) -> Self {
        Self {
            index,
            next_from: from.clone(),
            from,
            to,
            chunk: chunk.max(1),
            buf: VecDeque::new(),
            exhausted: false,
            guard: Some(CursorGuard::acquire(tracker)),
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.guard.is_some()
    }

    /// Release the cursor. Further reads return `None`.
    pub fn close(&mut self) {
        self.guard = None;
        self.buf.clear();
        self.exhausted = true;
    }

    /// Reposition so the next entry is the first with `key >= target`.
    ///
    /// Seeking never moves before the cursor's original lower bound.
    pub fn seek(&mut self, target: Vec<u8>) {
        if !self.is_open() {
            return;
        }
        let target = match &self.from {
            Some(from) if target < *from => from.clone(),
            _ => target,
        };
        self.buf.clear();
        self.exhausted = self.to.as_deref().is_some_and(|to| target.as_slice() >= to);
        self.next_from = Some(target);
    }

    fn fill(&mut self) -> Result<()> {
        let batch = self
            .index
            .read_range(self.next_from.as_deref(), self.to.as_deref(), self.chunk)?;
        if batch.len() < self.chunk {
            self.exhausted = true;
        }
        if let Some((last, _)) = batch.last() {
            // smallest key strictly greater than `last`
            let mut next = Vec::with_capacity(last.len() + 1);
            next.extend_from_slice(last);
            next.push(0);
            self.next_from = Some(next);
        }
        self.buf.extend(batch);
        Ok(())
    }

    /// Next entry, or `None` once the range is exhausted.
    pub fn next_entry(&mut self) -> Result<Option<Entry>> {
        if self.buf.is_empty() && !self.exhausted {
            if let Err(e) = self.fill() {
                self.close();
                return Err(e);
            }
        }
        match self.buf.pop_front() {
            Some(entry) => Ok(Some(entry)),
            None => {
                self.close();
                Ok(None)
            }
        }
    }
}

impl Iterator for IndexCursor {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

impl fmt::Debug for IndexCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexCursor")
            .field("index", &self.index.name())
            .field("open", &self.is_open())
            .field("buffered", &self.buf.len())
            .finish()
    }
}
