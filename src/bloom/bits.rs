//! Fixed-size bit array backed by `AtomicU64` words.
//!
//! `set` and `get` take `&self`, so the array can be shared between request
//! tasks without a lock. `set` uses `Release` and `get` uses `Acquire`, which
//! means a thread that observes a bit also observes every bit set before it
//! by the same insert.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub(crate) struct AtomicBits {
    words: Box<[AtomicU64]>,
    len: usize,
}

impl AtomicBits {
    /// Allocates `len` zeroed bits, rounded up to whole words.
    pub(crate) fn new(len: usize) -> Self {
        let words = (0..len.div_ceil(64)).map(|_| AtomicU64::new(0)).collect();
        Self { words, len }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Sets bit `index`, returning whether it was previously clear.
    #[inline]
    pub(crate) fn set(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "bit {index} out of range {}", self.len);
        let mask = 1u64 << (index % 64);
        let previous = self.words[index / 64].fetch_or(mask, Ordering::Release);
        previous & mask == 0
    }

    #[inline]
    pub(crate) fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "bit {index} out of range {}", self.len);
        let mask = 1u64 << (index % 64);
        self.words[index / 64].load(Ordering::Acquire) & mask != 0
    }

    pub(crate) fn count_ones(&self) -> usize {
        self.words
            .iter()
            .map(|w| w.load(Ordering::Relaxed).count_ones() as usize)
            .sum()
    }

    pub(crate) fn memory_bytes(&self) -> usize {
        self.words.len() * std::mem::size_of::<AtomicU64>()
    }
}
