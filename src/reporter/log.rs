use async_trait::async_trait;

use super::Sink;
use crate::error::Result;
use crate::metrics::{MetricValue, RegistrySnapshot};

/// Writes each metric as one structured `tracing` event on the
/// `axum_monitor::report` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn export(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        for (name, value) in &snapshot.metrics {
            log_metric(name, value);
        }
        Ok(())
    }
}

fn log_metric(name: &str, value: &MetricValue) {
    const TARGET: &str = "axum_monitor::report";
    match value {
        MetricValue::Counter { count } => {
            tracing::info!(target: TARGET, metric = name, kind = "counter", count = *count);
        }
        MetricValue::Gauge { value } => {
            tracing::info!(target: TARGET, metric = name, kind = "gauge", value = *value);
        }
        MetricValue::GaugeFloat64 { value } => {
            tracing::info!(target: TARGET, metric = name, kind = "gauge_float64", value = *value);
        }
        MetricValue::Meter(m) => {
            tracing::info!(
                target: TARGET,
                metric = name,
                kind = "meter",
                count = m.count,
                rate1 = m.rate1,
                rate5 = m.rate5,
                rate15 = m.rate15,
                rate_mean = m.rate_mean
            );
        }
        MetricValue::Histogram(h) => {
            tracing::info!(
                target: TARGET,
                metric = name,
                kind = "histogram",
                count = h.count,
                min = h.min,
                max = h.max,
                mean = h.mean,
                stddev = h.stddev,
                p50 = h.p50,
                p75 = h.p75,
                p95 = h.p95,
                p99 = h.p99,
                p999 = h.p999
            );
        }
        MetricValue::Timer(t) => {
            let d = &t.durations_us;
            tracing::info!(
                target: TARGET,
                metric = name,
                kind = "timer",
                count = d.count,
                min_us = d.min,
                max_us = d.max,
                mean_us = d.mean,
                p50_us = d.p50,
                p95_us = d.p95,
                p99_us = d.p99,
                p999_us = d.p999,
                rate1 = t.rate.rate1,
                rate_mean = t.rate.rate_mean
            );
        }
    }
}
