//! Rate-tracking counter.
//!
//! Besides the running total, a [`Meter`] keeps exponentially weighted moving
//! averages over 1, 5 and 15 minutes. The averages advance in fixed 5 second
//! ticks; instead of a background ticker, every `mark` and `snapshot` catches up
//! on the ticks that elapsed since the last one.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

const TICK: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Meter {
    inner: Arc<MeterInner>,
}

#[derive(Debug)]
struct MeterInner {
    count: AtomicI64,
    started: Instant,
    rates: Mutex<Rates>,
}

#[derive(Debug)]
struct Rates {
    uncounted: i64,
    last_tick: Instant,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

/// Point-in-time view of a meter. Rates are events per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeterSnapshot {
    pub count: i64,
    pub rate1: f64,
    pub rate5: f64,
    pub rate15: f64,
    pub rate_mean: f64,
}

impl Meter {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            inner: Arc::new(MeterInner {
                count: AtomicI64::new(0),
                started: now,
                rates: Mutex::new(Rates {
                    uncounted: 0,
                    last_tick: now,
                    m1: Ewma::over_minutes(1.0),
                    m5: Ewma::over_minutes(5.0),
                    m15: Ewma::over_minutes(15.0),
                }),
            }),
        }
    }

    /// Records `n` events.
    pub fn mark(&self, n: i64) {
        self.inner.count.fetch_add(n, Ordering::Relaxed);
        let mut rates = self.inner.rates.lock();
        rates.catch_up(Instant::now());
        rates.uncounted += n;
    }

    pub fn count(&self) -> i64 {
        self.inner.count.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        let now = Instant::now();
        let (rate1, rate5, rate15) = {
            let mut rates = self.inner.rates.lock();
            rates.catch_up(now);
            (rates.m1.rate, rates.m5.rate, rates.m15.rate)
        };

        let count = self.count();
        let elapsed = now.duration_since(self.inner.started).as_secs_f64();
        #[allow(clippy::cast_precision_loss)]
        let rate_mean = if elapsed > 0.0 { count as f64 / elapsed } else { 0.0 };

        MeterSnapshot {
            count,
            rate1,
            rate5,
            rate15,
            rate_mean,
        }
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

impl Rates {
    /// Applies every whole tick between `last_tick` and `now`.
    fn catch_up(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_tick);
        let ticks = elapsed.as_nanos() / TICK.as_nanos();
        if ticks == 0 {
            return;
        }

        // The pending events all land in the first tick; the rest are idle.
        let idle = i32::try_from(ticks - 1).unwrap_or(i32::MAX);
        let pending = std::mem::take(&mut self.uncounted);
        for ewma in [&mut self.m1, &mut self.m5, &mut self.m15] {
            ewma.tick(pending);
            ewma.decay(idle);
        }

        #[allow(clippy::cast_possible_truncation)]
        let advanced = TICK * ticks.min(u128::from(u32::MAX)) as u32;
        self.last_tick += advanced;
    }
}

#[derive(Debug)]
struct Ewma {
    alpha: f64,
    rate: f64,
    primed: bool,
}

impl Ewma {
    fn over_minutes(minutes: f64) -> Self {
        Self {
            alpha: 1.0 - (-TICK.as_secs_f64() / 60.0 / minutes).exp(),
            rate: 0.0,
            primed: false,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn tick(&mut self, events: i64) {
        let instant = events as f64 / TICK.as_secs_f64();
        if self.primed {
            self.rate += self.alpha * (instant - self.rate);
        } else {
            self.rate = instant;
            self.primed = true;
        }
    }

    /// Equivalent to `ticks` calls of `tick(0)` on a primed average.
    fn decay(&mut self, ticks: i32) {
        if ticks > 0 {
            self.rate *= (1.0 - self.alpha).powi(ticks);
        }
    }
}
