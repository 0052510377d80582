//! Integer distribution backed by a forward-decaying reservoir.
//!
//! [`ExpDecaySample`] keeps at most `reservoir_size` observations. Each one is
//! given the priority `e^(α·age) / u` with `u` uniform in `(0, 1]`, so recent
//! values outrank old ones and the reservoir is biased towards roughly the last
//! five minutes at the default `α = 0.015`. Priorities are rebased every hour to
//! keep the exponent from overflowing.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;

use super::percentiles::PercentileSet;

/// Reservoir size used by registry-created histograms.
pub const DEFAULT_RESERVOIR_SIZE: usize = 1028;

/// Decay factor used by registry-created histograms.
pub const DEFAULT_ALPHA: f64 = 0.015;

const RESCALE_THRESHOLD: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct Histogram {
    sample: Arc<Mutex<ExpDecaySample>>,
}

impl Histogram {
    pub fn new(reservoir_size: usize, alpha: f64) -> Self {
        Self {
            sample: Arc::new(Mutex::new(ExpDecaySample::new(reservoir_size, alpha))),
        }
    }

    pub fn update(&self, value: i64) {
        self.sample.lock().update(value, Instant::now());
    }

    /// Total observations, including those evicted from the reservoir.
    pub fn count(&self) -> u64 {
        self.sample.lock().count
    }

    pub fn clear(&self) {
        self.sample.lock().clear();
    }

    pub fn snapshot(&self) -> PercentileSet {
        // Copy out under the lock; sorting happens after it is released.
        let (count, mut values) = {
            let sample = self.sample.lock();
            (sample.count, sample.values())
        };
        PercentileSet::from_samples(count, &mut values)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new(DEFAULT_RESERVOIR_SIZE, DEFAULT_ALPHA)
    }
}

#[derive(Debug)]
pub struct ExpDecaySample {
    reservoir_size: usize,
    alpha: f64,
    count: u64,
    landmark: Instant,
    next_rescale: Instant,
    // Min-heap on priority: the root is the first candidate for eviction.
    heap: BinaryHeap<Reverse<Weighted>>,
}

impl ExpDecaySample {
    pub fn new(reservoir_size: usize, alpha: f64) -> Self {
        let now = Instant::now();
        let reservoir_size = reservoir_size.max(1);
        Self {
            reservoir_size,
            alpha,
            count: 0,
            landmark: now,
            next_rescale: now + RESCALE_THRESHOLD,
            heap: BinaryHeap::with_capacity(reservoir_size + 1),
        }
    }

    pub fn update(&mut self, value: i64, now: Instant) {
        if now >= self.next_rescale {
            self.rescale(now);
        }
        self.count += 1;

        let age = now.saturating_duration_since(self.landmark).as_secs_f64();
        let u: f64 = 1.0 - rand::thread_rng().gen::<f64>();
        let candidate = Weighted {
            priority: (self.alpha * age).exp() / u,
            value,
        };

        if self.heap.len() < self.reservoir_size {
            self.heap.push(Reverse(candidate));
        } else if let Some(mut lowest) = self.heap.peek_mut() {
            if candidate.priority > lowest.0.priority {
                *lowest = Reverse(candidate);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn values(&self) -> Vec<i64> {
        self.heap.iter().map(|w| w.0.value).collect()
    }

    pub fn clear(&mut self) {
        let now = Instant::now();
        self.heap.clear();
        self.count = 0;
        self.landmark = now;
        self.next_rescale = now + RESCALE_THRESHOLD;
    }

    fn rescale(&mut self, now: Instant) {
        let shift = now.saturating_duration_since(self.landmark).as_secs_f64();
        let factor = (-self.alpha * shift).exp();
        self.landmark = now;
        self.next_rescale = now + RESCALE_THRESHOLD;

        let rebased = std::mem::take(&mut self.heap)
            .into_iter()
            .map(|Reverse(w)| {
                Reverse(Weighted {
                    priority: w.priority * factor,
                    value: w.value,
                })
            })
            .collect();
        self.heap = rebased;
    }
}

#[derive(Debug, Clone, Copy)]
struct Weighted {
    priority: f64,
    value: i64,
}

impl PartialEq for Weighted {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Weighted {}

impl PartialOrd for Weighted {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Weighted {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.total_cmp(&other.priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn reservoir_is_bounded() {
        let mut sample = ExpDecaySample::new(100, DEFAULT_ALPHA);
        let now = Instant::now();
        for v in 0..5_000 {
            sample.update(v, now);
        }
        assert_eq!(sample.len(), 100);
        assert_eq!(sample.count, 5_000);
        assert!(sample.values().iter().all(|v| (0..5_000).contains(v)));
    }

    #[test]
    fn recent_values_dominate() {
        let mut sample = ExpDecaySample::new(100, DEFAULT_ALPHA);
        let start = Instant::now();
        for _ in 0..1_000 {
            sample.update(1, start);
        }
        // Ten minutes later the decay weight is e^9, far above any old priority
        // short of a vanishingly unlikely draw.
        let later = start + Duration::from_secs(600);
        for _ in 0..1_000 {
            sample.update(2, later);
        }
        let twos = sample.values().iter().filter(|&&v| v == 2).count();
        assert!(twos >= 95, "only {twos} recent values kept");
    }

    #[test]
    fn rescale_keeps_contents() {
        let mut sample = ExpDecaySample::new(10, DEFAULT_ALPHA);
        let start = sample.landmark;
        for v in 0..10 {
            sample.update(v, start);
        }
        sample.update(99, start + RESCALE_THRESHOLD + Duration::from_secs(1));
        assert_eq!(sample.len(), 10);
        assert_eq!(sample.count, 11);
        assert!(sample.landmark > start);
        assert!(sample.heap.iter().all(|w| w.0.priority.is_finite()));
    }

    #[test]
    fn histogram_snapshot_summarises() {
        let h = Histogram::default();
        assert!(!h.snapshot().has_data());
        for v in 1..=10 {
            h.update(v);
        }
        let snap = h.snapshot();
        assert_eq!(snap.count, 10);
        assert_eq!(snap.min, 1);
        assert_eq!(snap.max, 10);
        assert!((snap.mean - 5.5).abs() < 1e-9);

        h.clear();
        assert_eq!(h.count(), 0);
    }

    #[test]
    fn concurrent_updates_are_counted() {
        let h = Histogram::default();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let h = h.clone();
                thread::spawn(move || {
                    for v in 0..500 {
                        h.update(v);
                    }
                })
            })
            .collect();
        for t in handles {
            t.join().unwrap();
        }
        assert_eq!(h.count(), 4_000);
        assert_eq!(h.snapshot().count, 4_000);
    }
}
