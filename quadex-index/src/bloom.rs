//! Bloom filter guarding point tests on the primary index.
//!
//! Sized from `(expected_capacity, error_rate)`:
//!
//! ```text
//! m = ceil(-n * ln(p) / ln(2)^2)      bits
//! k = max(1, round(m / n * ln(2)))    hash functions
//! ```
//!
//! The filter also computes the key count at which its false-positive rate
//! reaches `max_error_rate`. Once more keys than that have been added it
//! disables itself for good; [`BloomFilterGuard::rebuild`] installs a fresh
//! generation. A disabled filter answers "maybe" for every key, so lookups
//! fall through to the index.
//!
//! Bits are `AtomicU64` words so concurrent writers never need a lock. Hashes
//! are `xxh3_128`, split into two halves for double hashing.

use crate::config::BloomFilterConfig;
use crate::error::Result;
use crate::storage::SortedIndex;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_128;

/// Point-in-time bloom filter counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloomFilterStats {
    pub generation: u64,
    pub enabled: bool,
    pub num_bits: u64,
    pub num_hashes: u32,
    pub max_keys: u64,
    pub keys_added: u64,
    pub tests: u64,
    pub rejections: u64,
    pub estimated_error_rate: f64,
}

#[derive(Debug)]
pub struct BloomFilter {
    words: Box<[AtomicU64]>,
    num_bits: u64,
    num_hashes: u32,
    max_keys: u64,
    keys_added: AtomicU64,
    tests: AtomicU64,
    rejections: AtomicU64,
    enabled: AtomicBool,
}

impl BloomFilter {
    pub fn new(config: &BloomFilterConfig) -> Self {
        let n = config.expected_capacity.max(1) as f64;
        let ln2 = std::f64::consts::LN_2;
        let num_bits = ((-n * config.error_rate.ln()) / (ln2 * ln2)).ceil().max(64.0) as u64;
        let num_hashes = ((num_bits as f64 / n) * ln2).round().max(1.0) as u32;
        let max_keys = max_keys_for(num_bits, num_hashes, config.max_error_rate);
        let words = (0..num_bits.div_ceil(64)).map(|_| AtomicU64::new(0)).collect();
        Self {
            words,
            num_bits,
            num_hashes,
            max_keys,
            keys_added: AtomicU64::new(0),
            tests: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            enabled: AtomicBool::new(true),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Key count at which the false-positive rate reaches the configured max
    pub fn max_keys(&self) -> u64 {
        self.max_keys
    }

    #[inline]
    fn probes(&self, key: &[u8]) -> impl Iterator<Item = u64> {
        let h = xxh3_128(key);
        let h1 = h as u64;
        let h2 = ((h >> 64) as u64) | 1;
        let m = self.num_bits;
        (0..self.num_hashes as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % m)
    }

    /// Record `key`. Returns whether the filter is still enabled.
    pub fn add(&self, key: &[u8]) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let mut changed = false;
        for bit in self.probes(key) {
            let mask = 1u64 << (bit % 64);
            let prev = self.words[(bit / 64) as usize].fetch_or(mask, Ordering::AcqRel);
            changed |= prev & mask == 0;
        }
        if changed {
            let added = self.keys_added.fetch_add(1, Ordering::AcqRel) + 1;
            if added > self.max_keys {
                self.disable(added);
                return false;
            }
        }
        true
    }

    fn disable(&self, added: u64) {
        if self.enabled.swap(false, Ordering::AcqRel) {
            tracing::warn!(
                keys_added = added,
                max_keys = self.max_keys,
                estimated_error_rate = self.estimated_error_rate(),
                "bloom filter disabled: error rate over budget"
            );
        }
    }

    /// `false` means the key is definitely absent. A disabled filter always
    /// answers `true`.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        if !self.is_enabled() {
            return true;
        }
        self.tests.fetch_add(1, Ordering::Relaxed);
        let hit = self.probes(key).all(|bit| {
            let mask = 1u64 << (bit % 64);
            self.words[(bit / 64) as usize].load(Ordering::Acquire) & mask != 0
        });
        if !hit {
            self.rejections.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    /// `(1 - e^(-k * n / m))^k` for the number of keys added so far
    pub fn estimated_error_rate(&self) -> f64 {
        error_rate(
            self.num_bits,
            self.num_hashes,
            self.keys_added.load(Ordering::Acquire),
        )
    }

    pub fn stats(&self, generation: u64) -> BloomFilterStats {
        BloomFilterStats {
            generation,
            enabled: self.is_enabled(),
            num_bits: self.num_bits,
            num_hashes: self.num_hashes,
            max_keys: self.max_keys,
            keys_added: self.keys_added.load(Ordering::Relaxed),
            tests: self.tests.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            estimated_error_rate: self.estimated_error_rate(),
        }
    }
}

fn error_rate(m: u64, k: u32, n: u64) -> f64 {
    let k = k as f64;
    (1.0 - (-k * n as f64 / m as f64).exp()).powf(k)
}

fn max_keys_for(m: u64, k: u32, max_error_rate: f64) -> u64 {
    let kf = k as f64;
    let inner = 1.0 - max_error_rate.powf(1.0 / kf);
    if inner <= 0.0 {
        return u64::MAX;
    }
    (-(m as f64 / kf) * inner.ln()).floor() as u64
}

/// The current filter generation for one primary index.
#[derive(Debug)]
pub struct BloomFilterGuard {
    config: BloomFilterConfig,
    current: RwLock<Arc<BloomFilter>>,
    generation: AtomicU64,
}

impl BloomFilterGuard {
    pub fn new(config: BloomFilterConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(BloomFilter::new(&config))),
            config,
            generation: AtomicU64::new(0),
        }
    }

    /// The filter in effect right now
    pub fn filter(&self) -> Arc<BloomFilter> {
        Arc::clone(&self.current.read())
    }

    pub fn is_enabled(&self) -> bool {
        self.current.read().is_enabled()
    }

    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.current.read().may_contain(key)
    }

    pub fn add(&self, key: &[u8]) -> bool {
        self.current.read().add(key)
    }

    pub fn stats(&self) -> BloomFilterStats {
        self.current
            .read()
            .stats(self.generation.load(Ordering::Relaxed))
    }

    /// Build a new generation from every key in `index` and install it.
    ///
    /// Writers that run concurrently with a rebuild may be missed by the new
    /// generation; callers rebuild while the relation is quiescent.
    pub fn rebuild(&self, index: &dyn SortedIndex, chunk: usize) -> Result<BloomFilterStats> {
        let fresh = BloomFilter::new(&self.config);
        let mut from: Option<Vec<u8>> = None;
        loop {
            let batch = index.read_range(from.as_deref(), None, chunk)?;
            let Some((last, _)) = batch.last() else {
                break;
            };
            let mut next = last.clone();
            next.push(0);
            for (key, _) in &batch {
                fresh.add(key);
            }
            from = Some(next);
            if batch.len() < chunk {
                break;
            }
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let stats = fresh.stats(generation);
        *self.current.write() = Arc::new(fresh);
        tracing::info!(
            generation,
            keys = stats.keys_added,
            enabled = stats.enabled,
            "bloom filter rebuilt"
        );
        Ok(stats)
    }
}
