//! Index handles for one relation.
//!
//! The set owns one lazily resolved [`IndexHandle`] per configured key order,
//! plus the justification index when enabled. Handles are resolved through
//! the [`IndexManager`] on first use and cached for the set's lifetime. They
//! hold no reference back to the relation.

use crate::bloom::BloomFilterGuard;
use crate::config::{BloomFilterConfig, SpoRelationConfig};
use crate::cursor::CursorTracker;
use crate::error::{RelationError, Result};
use crate::storage::{IndexManager, SortedIndex};
use once_cell::sync::OnceCell;
use quadex_core::KeyOrder;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

const JUSTIFICATION_SUFFIX: &str = "JUST";

/// One physical index and the key order it is sorted by.
#[derive(Clone)]
pub struct IndexHandle {
    key_order: KeyOrder,
    index: Arc<dyn SortedIndex>,
    bloom: Option<Arc<BloomFilterGuard>>,
}

impl IndexHandle {
    #[inline]
    pub fn key_order(&self) -> KeyOrder {
        self.key_order
    }

    #[inline]
    pub fn index(&self) -> &Arc<dyn SortedIndex> {
        &self.index
    }

    /// Bloom filter, present only on the primary index
    pub fn bloom(&self) -> Option<&Arc<BloomFilterGuard>> {
        self.bloom.as_ref()
    }
}

impl fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexHandle")
            .field("key_order", &self.key_order)
            .field("index", &self.index.name())
            .field("bloom", &self.bloom.is_some())
            .finish()
    }
}

pub struct IndexSet {
    manager: Arc<dyn IndexManager>,
    namespace: String,
    quads: bool,
    key_orders: Vec<KeyOrder>,
    handles: FxHashMap<KeyOrder, OnceCell<IndexHandle>>,
    justify: bool,
    justifications: OnceCell<Arc<dyn SortedIndex>>,
    bloom: Option<Arc<BloomFilterGuard>>,
    tracker: Arc<CursorTracker>,
}

impl IndexSet {
    pub fn new(
        manager: Arc<dyn IndexManager>,
        namespace: impl Into<String>,
        config: &SpoRelationConfig,
    ) -> Self {
        let primary = KeyOrder::primary(config.quads);
        let key_orders: Vec<KeyOrder> = if config.one_access_path {
            vec![primary]
        } else {
            KeyOrder::orders(config.quads).to_vec()
        };
        let handles = key_orders.iter().map(|&k| (k, OnceCell::new())).collect();
        Self {
            manager,
            namespace: namespace.into(),
            quads: config.quads,
            key_orders,
            handles,
            justify: config.justify,
            justifications: OnceCell::new(),
            bloom: config
                .bloom_filter
                .map(|b: BloomFilterConfig| Arc::new(BloomFilterGuard::new(b))),
            tracker: Arc::new(CursorTracker::new()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Configured key orders, primary first
    pub fn key_orders(&self) -> &[KeyOrder] {
        &self.key_orders
    }

    pub fn primary_key_order(&self) -> KeyOrder {
        KeyOrder::primary(self.quads)
    }

    pub fn is_configured(&self, key_order: KeyOrder) -> bool {
        self.handles.contains_key(&key_order)
    }

    pub fn index_name(&self, key_order: KeyOrder) -> String {
        format!("{}.{}", self.namespace, key_order)
    }

    pub fn justification_index_name(&self) -> String {
        format!("{}.{}", self.namespace, JUSTIFICATION_SUFFIX)
    }

    pub fn cursor_tracker(&self) -> &Arc<CursorTracker> {
        &self.tracker
    }

    pub fn bloom(&self) -> Option<&Arc<BloomFilterGuard>> {
        self.bloom.as_ref()
    }

    fn resolve(&self, name: &str) -> Result<Arc<dyn SortedIndex>> {
        self.manager
            .get_index(name)?
            .ok_or_else(|| RelationError::unknown_index(name))
    }

    /// Handle for a configured key order, resolved on first use.
    pub fn handle(&self, key_order: KeyOrder) -> Result<&IndexHandle> {
        key_order.ensure_mode(self.quads)?;
        let cell = self.handles.get(&key_order).ok_or_else(|| {
            RelationError::unknown_index(format!(
                "{} is not maintained by {}",
                key_order, self.namespace
            ))
        })?;
        cell.get_or_try_init(|| {
            let index = self.resolve(&self.index_name(key_order))?;
            let bloom = if key_order.is_primary() {
                self.bloom.clone()
            } else {
                None
            };
            Ok(IndexHandle {
                key_order,
                index,
                bloom,
            })
        })
    }

    pub fn primary(&self) -> Result<&IndexHandle> {
        self.handle(self.primary_key_order())
    }

    /// The justification index, or `None` when justifications are off.
    pub fn justification_index(&self) -> Result<Option<&Arc<dyn SortedIndex>>> {
        if !self.justify {
            return Ok(None);
        }
        self.justifications
            .get_or_try_init(|| self.resolve(&self.justification_index_name()))
            .map(Some)
    }

    fn all_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .key_orders
            .iter()
            .map(|&k| self.index_name(k))
            .collect();
        if self.justify {
            names.push(self.justification_index_name());
        }
        names
    }

    /// Register every index this set maintains.
    pub fn create_all(&self) -> Result<()> {
        for name in self.all_names() {
            self.manager.register_index(&name)?;
            tracing::debug!(index = %name, "registered index");
        }
        Ok(())
    }

    /// Whether every index this set maintains is registered.
    pub fn all_exist(&self) -> Result<bool> {
        for name in self.all_names() {
            if self.manager.get_index(&name)?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Drop every index this set maintains.
    pub fn drop_all(&self) -> Result<()> {
        for name in self.all_names() {
            self.manager.drop_index(&name)?;
        }
        Ok(())
    }

    /// A scratch index from the manager
    pub fn temp_index(&self) -> Result<Arc<dyn SortedIndex>> {
        self.manager.temp_index()
    }
}

impl fmt::Debug for IndexSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexSet")
            .field("namespace", &self.namespace)
            .field("key_orders", &self.key_orders)
            .field("justify", &self.justify)
            .finish()
    }
}
