use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::RwLock;

use super::{
    Counter, Gauge, GaugeFloat64, Histogram, Instrument, Meter, Metric, RegistrySnapshot, Timer,
};
use crate::error::{MonitorError, Result};

/// A `Registry` maps metric names to instruments.
///
/// Instruments are created on first reference and shared afterwards: every
/// lookup of a name yields a handle onto the same instrument. Asking for a
/// name under a different kind than it was registered with is an error and
/// leaves the registered instrument untouched.
///
/// A `BTreeMap` keeps snapshots in name order.
#[derive(Debug, Default)]
pub struct Registry {
    instruments: RwLock<BTreeMap<String, Metric>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the instrument registered under `name`, or stores and returns
    /// the one built by `create`.
    ///
    /// `create` runs at most once per name, under the write lock, so concurrent
    /// first callers all receive the same instrument.
    pub fn get_or_register<I, F>(&self, name: &str, create: F) -> Result<I>
    where
        I: Instrument,
        F: FnOnce() -> I,
    {
        if let Some(existing) = self.instruments.read().get(name) {
            return downcast(name, existing);
        }

        let mut instruments = self.instruments.write();
        match instruments.entry(name.to_owned()) {
            Entry::Occupied(o) => downcast(name, o.get()),
            Entry::Vacant(v) => {
                let instrument = create();
                v.insert(instrument.clone().into_metric());
                Ok(instrument)
            }
        }
    }

    pub fn counter(&self, name: &str) -> Result<Counter> {
        self.get_or_register(name, Counter::new)
    }

    pub fn gauge(&self, name: &str) -> Result<Gauge> {
        self.get_or_register(name, Gauge::new)
    }

    pub fn gauge_f64(&self, name: &str) -> Result<GaugeFloat64> {
        self.get_or_register(name, GaugeFloat64::new)
    }

    pub fn meter(&self, name: &str) -> Result<Meter> {
        self.get_or_register(name, Meter::new)
    }

    /// Histogram over an exponentially decaying reservoir of 1028 samples, α = 0.015.
    pub fn histogram(&self, name: &str) -> Result<Histogram> {
        self.get_or_register(name, Histogram::default)
    }

    pub fn timer(&self, name: &str) -> Result<Timer> {
        self.get_or_register(name, Timer::new)
    }

    /// The instrument under `name`, if any, whatever its kind.
    pub fn get(&self, name: &str) -> Option<Metric> {
        self.instruments.read().get(name).cloned()
    }

    /// Removes `name`. Handles already given out keep working but are no
    /// longer reported.
    pub fn unregister(&self, name: &str) -> Option<Metric> {
        self.instruments.write().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.instruments.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.instruments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.read().is_empty()
    }

    /// Reads every instrument, in name order.
    ///
    /// Handles are cloned out first so no instrument is read while the
    /// registry lock is held.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let handles: Vec<(String, Metric)> = self
            .instruments
            .read()
            .iter()
            .map(|(name, metric)| (name.clone(), metric.clone()))
            .collect();

        RegistrySnapshot {
            taken_at: Utc::now(),
            metrics: handles
                .into_iter()
                .map(|(name, metric)| (name, metric.snapshot()))
                .collect(),
        }
    }
}

fn downcast<I: Instrument>(name: &str, metric: &Metric) -> Result<I> {
    I::from_metric(metric).ok_or_else(|| MonitorError::KindMismatch {
        name: name.to_owned(),
        registered: metric.kind(),
        requested: I::KIND,
    })
}
