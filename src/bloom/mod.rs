//! Approximate set used to deduplicate client identifiers.
//!
//! A [`BloomFilter`] answers "has this key been seen before?" in constant time
//! and fixed memory. Keys that were inserted always test positive. Keys that
//! were never inserted test positive with a probability that starts near zero
//! and rises as the filter fills up; there is no removal.
//!
//! The `k` probe positions come from two seeded [`foldhash`] hashes combined by
//! enhanced double hashing: `gᵢ = h₁ + i·h₂ + (i² + i)/2 (mod m)`.
//!
//! `contains` followed by `insert` is not atomic. Two requests from the same new
//! client racing through that window can both see `false`; callers counting
//! unique visitors accept that overcount.

mod bits;
pub mod params;

use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, Ordering};

use foldhash::fast::FixedState;

use crate::error::Result;
use bits::AtomicBits;

/// Expected distinct visitors a default filter is sized for.
pub const DEFAULT_EXPECTED_INSERTIONS: usize = 100_000;

/// Target false-positive rate of a default filter at its expected size.
pub const DEFAULT_FP_RATE: f64 = 0.01;

// Precomputed `optimal_bit_count(100_000, 0.01)` / `optimal_hash_count`.
const DEFAULT_BITS: usize = 958_506;
const DEFAULT_HASHES: u32 = 7;

const SEED_PRIMARY: u64 = 0x9e37_79b9_7f4a_7c15;
const SEED_SECONDARY: u64 = 0xc2b2_ae3d_27d4_eb4f;

#[derive(Debug)]
pub struct BloomFilter {
    bits: AtomicBits,
    hashes: u32,
    primary: FixedState,
    secondary: FixedState,
    /// Inserts that flipped at least one bit.
    insertions: AtomicU64,
}

impl BloomFilter {
    /// Sizes a filter for `expected_insertions` keys at `fp_rate`.
    pub fn new(expected_insertions: usize, fp_rate: f64) -> Result<Self> {
        let m = params::optimal_bit_count(expected_insertions, fp_rate)?;
        let k = params::optimal_hash_count(m, expected_insertions)?;
        Ok(Self::with_dimensions(m, k))
    }

    /// Builds a filter with an explicit bit count and hash count, clamped to
    /// `MIN_BITS..=MAX_BITS` and `1..=MAX_HASHES`.
    pub fn with_dimensions(bits: usize, hashes: u32) -> Self {
        let max_bits = usize::try_from(params::MAX_BITS).unwrap_or(usize::MAX);
        Self {
            bits: AtomicBits::new(bits.clamp(params::MIN_BITS, max_bits)),
            hashes: hashes.clamp(1, params::MAX_HASHES),
            primary: FixedState::with_seed(SEED_PRIMARY),
            secondary: FixedState::with_seed(SEED_SECONDARY),
            insertions: AtomicU64::new(0),
        }
    }

    /// True if `key` may have been inserted; false means it certainly was not.
    pub fn contains<K: Hash + ?Sized>(&self, key: &K) -> bool {
        self.probes(self.base_hashes(key)).all(|i| self.bits.get(i))
    }

    /// Records `key`. Inserting the same key again changes nothing.
    pub fn insert<K: Hash + ?Sized>(&self, key: &K) {
        // Every position must be set, so no short-circuiting here.
        let flipped = self
            .probes(self.base_hashes(key))
            .fold(false, |any, i| self.bits.set(i) | any);
        if flipped {
            self.insertions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn len_bits(&self) -> usize {
        self.bits.len()
    }

    pub fn hash_count(&self) -> u32 {
        self.hashes
    }

    /// Approximate count of distinct keys inserted so far.
    pub fn insertions(&self) -> u64 {
        self.insertions.load(Ordering::Relaxed)
    }

    pub fn memory_bytes(&self) -> usize {
        self.bits.memory_bytes()
    }

    /// Fraction of bits currently set.
    #[allow(clippy::cast_precision_loss)]
    pub fn fill_ratio(&self) -> f64 {
        self.bits.count_ones() as f64 / self.bits.len() as f64
    }

    /// Current false-positive probability, derived from the fill ratio.
    pub fn estimated_fp_rate(&self) -> f64 {
        params::fp_rate_from_fill(self.fill_ratio(), self.hashes)
    }

    fn base_hashes<K: Hash + ?Sized>(&self, key: &K) -> (u64, u64) {
        // Odd stride so successive probes never collapse onto one position.
        (self.primary.hash_one(key), self.secondary.hash_one(key) | 1)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn probes(&self, (h1, h2): (u64, u64)) -> impl Iterator<Item = usize> + '_ {
        let m = self.bits.len() as u64;
        (0..u64::from(self.hashes)).map(move |i| {
            let quadratic = i.wrapping_mul(i.wrapping_add(1)) >> 1;
            let h = h1
                .wrapping_add(i.wrapping_mul(h2))
                .wrapping_add(quadratic);
            (h % m) as usize
        })
    }
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::with_dimensions(DEFAULT_BITS, DEFAULT_HASHES)
    }
}
