//! Relation configuration.

use crate::error::{RelationError, Result};
use serde::{Deserialize, Serialize};

/// Bloom filter sizing for the primary index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BloomFilterConfig {
    /// Number of keys the filter is sized for
    pub expected_capacity: usize,
    /// Target false-positive rate at `expected_capacity`
    pub error_rate: f64,
    /// False-positive rate at which the filter disables itself
    pub max_error_rate: f64,
}

impl Default for BloomFilterConfig {
    fn default() -> Self {
        Self {
            expected_capacity: 1_000_000,
            error_rate: 0.02,
            max_error_rate: 0.15,
        }
    }
}

impl BloomFilterConfig {
    pub fn new(expected_capacity: usize, error_rate: f64, max_error_rate: f64) -> Self {
        Self {
            expected_capacity,
            error_rate,
            max_error_rate,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.expected_capacity == 0 {
            return Err(RelationError::invalid_config(
                "bloom filter capacity must be positive",
            ));
        }
        if !(self.error_rate > 0.0 && self.error_rate < 1.0) {
            return Err(RelationError::invalid_config(format!(
                "bloom filter error rate {} outside (0, 1)",
                self.error_rate
            )));
        }
        if !(self.max_error_rate >= self.error_rate && self.max_error_rate < 1.0) {
            return Err(RelationError::invalid_config(format!(
                "bloom filter max error rate {} must be in [{}, 1)",
                self.max_error_rate, self.error_rate
            )));
        }
        Ok(())
    }
}

/// Configuration for an [`SpoRelation`](crate::SpoRelation).
///
/// Serializable so it can be stored next to the relation's indices and
/// reloaded on open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoRelationConfig {
    /// Quad mode (SPOC and friends) instead of triples
    pub quads: bool,
    /// Register only the primary index
    pub one_access_path: bool,
    /// Maintain the justification index
    pub justify: bool,
    /// Inline statement identifiers (triples only)
    pub statement_identifiers: bool,
    /// Deletes write History markers instead of removing tuples
    pub history: bool,
    /// Bloom filter on the primary index
    pub bloom_filter: Option<BloomFilterConfig>,
    /// Relation takes part in snapshot-isolated transactions
    pub isolatable: bool,
    /// Inference is enabled for this relation
    pub inference: bool,
    /// Worker threads for per-index write tasks
    pub write_threads: usize,
    /// Batches larger than this record sort and write timings
    pub stats_threshold: usize,
    /// Keys kept in memory by a distinct tuple scan before spilling
    pub distinct_spill_threshold: usize,
    /// Entries a cursor reads from the index per fetch
    pub cursor_chunk: usize,
}

impl Default for SpoRelationConfig {
    fn default() -> Self {
        Self {
            quads: false,
            one_access_path: false,
            justify: false,
            statement_identifiers: false,
            history: false,
            bloom_filter: None,
            isolatable: false,
            inference: true,
            write_threads: default_write_threads(),
            stats_threshold: 1000,
            distinct_spill_threshold: 100_000,
            cursor_chunk: 1024,
        }
    }
}

fn default_write_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .max(2)
}

impl SpoRelationConfig {
    /// Triple-mode defaults
    pub fn triples() -> Self {
        Self::default()
    }

    /// Quad-mode defaults
    pub fn quads() -> Self {
        Self {
            quads: true,
            ..Self::default()
        }
    }

    pub fn with_one_access_path(mut self, on: bool) -> Self {
        self.one_access_path = on;
        self
    }

    pub fn with_justify(mut self, on: bool) -> Self {
        self.justify = on;
        self
    }

    pub fn with_statement_identifiers(mut self, on: bool) -> Self {
        self.statement_identifiers = on;
        self
    }

    pub fn with_history(mut self, on: bool) -> Self {
        self.history = on;
        self
    }

    pub fn with_bloom_filter(mut self, bloom: BloomFilterConfig) -> Self {
        self.bloom_filter = Some(bloom);
        self
    }

    pub fn with_isolation(mut self, isolatable: bool, inference: bool) -> Self {
        self.isolatable = isolatable;
        self.inference = inference;
        self
    }

    pub fn with_write_threads(mut self, n: usize) -> Self {
        self.write_threads = n;
        self
    }

    pub fn with_stats_threshold(mut self, n: usize) -> Self {
        self.stats_threshold = n;
        self
    }

    pub fn with_distinct_spill_threshold(mut self, n: usize) -> Self {
        self.distinct_spill_threshold = n;
        self
    }

    pub fn with_cursor_chunk(mut self, n: usize) -> Self {
        self.cursor_chunk = n;
        self
    }

    /// Key arity (3 or 4)
    pub fn key_arity(&self) -> usize {
        if self.quads {
            4
        } else {
            3
        }
    }

    /// Whether the write-write conflict resolver applies
    pub fn resolves_conflicts(&self) -> bool {
        self.isolatable && !self.inference
    }

    pub fn validate(&self) -> Result<()> {
        if self.quads && self.statement_identifiers {
            return Err(RelationError::invalid_config(
                "statement identifiers are not supported in quad mode",
            ));
        }
        if self.write_threads == 0 {
            return Err(RelationError::invalid_config("write_threads must be positive"));
        }
        if self.cursor_chunk == 0 {
            return Err(RelationError::invalid_config("cursor_chunk must be positive"));
        }
        if let Some(bloom) = &self.bloom_filter {
            bloom.validate()?;
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
