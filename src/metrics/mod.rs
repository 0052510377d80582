pub mod counter;
pub mod histogram;
pub mod meter;
pub mod percentiles;
pub mod registry;
pub mod timer;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use counter::{Counter, Gauge, GaugeFloat64};
pub use histogram::{ExpDecaySample, Histogram};
pub use meter::{Meter, MeterSnapshot};
pub use percentiles::PercentileSet;
pub use registry::Registry;
pub use timer::{Timer, TimerSnapshot};

/// The kinds of instrument a [`Registry`] can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Gauge,
    GaugeFloat64,
    Meter,
    Histogram,
    Timer,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::GaugeFloat64 => "gauge_float64",
            Self::Meter => "meter",
            Self::Histogram => "histogram",
            Self::Timer => "timer",
        };
        f.write_str(name)
    }
}

/// A registered instrument. Every variant is a cheap handle onto shared state.
#[derive(Debug, Clone)]
pub enum Metric {
    Counter(Counter),
    Gauge(Gauge),
    GaugeFloat64(GaugeFloat64),
    Meter(Meter),
    Histogram(Histogram),
    Timer(Timer),
}

impl Metric {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
            Self::GaugeFloat64(_) => MetricKind::GaugeFloat64,
            Self::Meter(_) => MetricKind::Meter,
            Self::Histogram(_) => MetricKind::Histogram,
            Self::Timer(_) => MetricKind::Timer,
        }
    }

    pub fn snapshot(&self) -> MetricValue {
        match self {
            Self::Counter(c) => MetricValue::Counter { count: c.count() },
            Self::Gauge(g) => MetricValue::Gauge { value: g.value() },
            Self::GaugeFloat64(g) => MetricValue::GaugeFloat64 { value: g.value() },
            Self::Meter(m) => MetricValue::Meter(m.snapshot()),
            Self::Histogram(h) => MetricValue::Histogram(h.snapshot()),
            Self::Timer(t) => MetricValue::Timer(t.snapshot()),
        }
    }
}

/// Typed access to one [`Metric`] variant, used by `Registry::get_or_register`.
pub trait Instrument: Clone + Send + Sync + 'static {
    const KIND: MetricKind;

    fn into_metric(self) -> Metric;

    fn from_metric(metric: &Metric) -> Option<Self>;
}

macro_rules! instrument {
    ($ty:ident) => {
        impl Instrument for $ty {
            const KIND: MetricKind = MetricKind::$ty;

            fn into_metric(self) -> Metric {
                Metric::$ty(self)
            }

            fn from_metric(metric: &Metric) -> Option<Self> {
                match metric {
                    Metric::$ty(m) => Some(m.clone()),
                    _ => None,
                }
            }
        }
    };
}

instrument!(Counter);
instrument!(Gauge);
instrument!(GaugeFloat64);
instrument!(Meter);
instrument!(Histogram);
instrument!(Timer);

/// Exported reading of a single instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricValue {
    Counter { count: i64 },
    Gauge { value: i64 },
    GaugeFloat64 { value: f64 },
    Meter(MeterSnapshot),
    Histogram(PercentileSet),
    Timer(TimerSnapshot),
}

impl MetricValue {
    /// Counter total, if this is a counter reading.
    pub fn as_count(&self) -> Option<i64> {
        match self {
            Self::Counter { count } => Some(*count),
            _ => None,
        }
    }

    pub fn as_timer(&self) -> Option<&TimerSnapshot> {
        match self {
            Self::Timer(t) => Some(t),
            _ => None,
        }
    }
}

/// Every instrument in a registry, read one after another.
///
/// Each reading is internally consistent; readings of different instruments
/// may straddle concurrent updates.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub taken_at: DateTime<Utc>,
    pub metrics: BTreeMap<String, MetricValue>,
}

impl RegistrySnapshot {
    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }

    /// Counter total for `name`, or 0 when it was never registered.
    pub fn count(&self, name: &str) -> i64 {
        self.get(name).and_then(MetricValue::as_count).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}
