use std::sync::Arc;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use super::meter::{Meter, MeterSnapshot};
use super::percentiles::PercentileSet;

/// HdrHistogram range: 1 μs → 60 s, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

/// Duration distribution plus the rate at which durations arrive.
///
/// Durations are recorded in microseconds; anything outside 1 μs – 60 s is
/// clamped to the nearest bound.
#[derive(Debug, Clone)]
pub struct Timer {
    durations: Arc<Mutex<Histogram<u64>>>,
    rate: Meter,
}

/// Point-in-time view of a timer. Duration fields are microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimerSnapshot {
    pub durations_us: PercentileSet,
    pub rate: MeterSnapshot,
}

impl Timer {
    /// # Panics
    ///
    /// Never in practice: the histogram bounds are constants, and
    /// `bounds_are_valid` checks them.
    pub fn new() -> Self {
        let durations = Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
            .expect("static histogram bounds are valid");
        Self {
            durations: Arc::new(Mutex::new(durations)),
            rate: Meter::new(),
        }
    }

    pub fn update(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.durations.lock().saturating_record(us.clamp(HIST_LOW, HIST_HIGH));
        self.rate.mark(1);
    }

    pub fn update_since(&self, start: Instant) {
        self.update(start.elapsed());
    }

    /// Runs `f`, records how long it took and passes its result through.
    pub fn time<T>(&self, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.update_since(start);
        out
    }

    pub fn count(&self) -> u64 {
        self.durations.lock().len()
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        let durations_us = PercentileSet::from_histogram(&self.durations.lock());
        TimerSnapshot {
            durations_us,
            rate: self.rate.snapshot(),
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
