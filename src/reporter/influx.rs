//! InfluxDB 1.x sink using the HTTP `/write` endpoint and line protocol.
//!
//! Every metric becomes one point named `{namespace}{metric}.{kind}`, e.g.
//! `api.request_total/all.count value=42i 1700000000000000000`.

use std::fmt::Write as _;

use async_trait::async_trait;

use super::Sink;
use crate::error::{MonitorError, Result};
use crate::metrics::{MetricValue, RegistrySnapshot};

#[derive(Debug, Clone)]
pub struct InfluxSink {
    client: reqwest::Client,
    write_url: String,
    database: String,
    username: String,
    password: String,
    namespace: String,
}

impl InfluxSink {
    pub fn new(
        url: String,
        database: String,
        username: String,
        password: String,
        namespace: String,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            write_url: format!("{}/write", url.trim_end_matches('/')),
            database,
            username,
            password,
            namespace,
        }
    }

    /// Renders `snapshot` as newline-separated line protocol.
    pub fn encode(&self, snapshot: &RegistrySnapshot) -> String {
        let ts = snapshot
            .taken_at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| snapshot.taken_at.timestamp() * 1_000_000_000);

        let mut body = String::new();
        for (name, value) in &snapshot.metrics {
            // Line protocol has no NaN or infinity; one such field fails the batch.
            if !is_finite(value) {
                tracing::debug!(metric = %name, "skipping non-finite reading");
                continue;
            }
            let (suffix, fields) = fields(value);
            let measurement = escape(&format!("{}{}.{}", self.namespace, name, suffix));
            // Writing to a String cannot fail.
            let _ = writeln!(body, "{measurement} {fields} {ts}");
        }
        body
    }
}

#[async_trait]
impl Sink for InfluxSink {
    fn name(&self) -> &'static str {
        "influxdb"
    }

    async fn export(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        if snapshot.is_empty() {
            return Ok(());
        }

        let mut request = self
            .client
            .post(&self.write_url)
            .query(&[("db", self.database.as_str()), ("precision", "ns")])
            .body(self.encode(snapshot));
        if !self.username.is_empty() {
            request = request.basic_auth(&self.username, Some(&self.password));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MonitorError::SinkRejected {
                sink: "influxdb",
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

fn fields(value: &MetricValue) -> (&'static str, String) {
    match value {
        MetricValue::Counter { count } => ("count", format!("value={count}i")),
        MetricValue::Gauge { value } => ("gauge", format!("value={value}i")),
        MetricValue::GaugeFloat64 { value } => ("gauge", format!("value={value}")),
        MetricValue::Meter(m) => (
            "meter",
            format!(
                "count={}i,m1={},m5={},m15={},mean={}",
                m.count, m.rate1, m.rate5, m.rate15, m.rate_mean
            ),
        ),
        MetricValue::Histogram(h) => (
            "histogram",
            format!(
                "count={}i,min={}i,max={}i,mean={},stddev={},p50={},p75={},p95={},p99={},p999={}",
                h.count, h.min, h.max, h.mean, h.stddev, h.p50, h.p75, h.p95, h.p99, h.p999
            ),
        ),
        MetricValue::Timer(t) => {
            let d = &t.durations_us;
            (
                "timer",
                format!(
                    "count={}i,min={}i,max={}i,mean={},stddev={},p50={},p75={},p95={},p99={},p999={},\
                     m1={},m5={},m15={},meanrate={}",
                    d.count,
                    d.min,
                    d.max,
                    d.mean,
                    d.stddev,
                    d.p50,
                    d.p75,
                    d.p95,
                    d.p99,
                    d.p999,
                    t.rate.rate1,
                    t.rate.rate5,
                    t.rate.rate15,
                    t.rate.rate_mean
                ),
            )
        }
    }
}

fn is_finite(value: &MetricValue) -> bool {
    let floats = match value {
        MetricValue::Counter { .. } | MetricValue::Gauge { .. } => return true,
        MetricValue::GaugeFloat64 { value } => vec![*value],
        MetricValue::Meter(m) => vec![m.rate1, m.rate5, m.rate15, m.rate_mean],
        MetricValue::Histogram(h) => vec![h.mean, h.stddev, h.p50, h.p75, h.p95, h.p99, h.p999],
        MetricValue::Timer(t) => {
            let d = &t.durations_us;
            vec![
                d.mean,
                d.stddev,
                d.p50,
                d.p75,
                d.p95,
                d.p99,
                d.p999,
                t.rate.rate1,
                t.rate.rate5,
                t.rate.rate15,
                t.rate.rate_mean,
            ]
        }
    };
    floats.iter().all(|f| f.is_finite())
}

/// Measurement names must escape commas and spaces.
fn escape(measurement: &str) -> String {
    measurement.replace(',', "\\,").replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Registry;

    fn sink(namespace: &str) -> InfluxSink {
        InfluxSink::new(
            "http://localhost:8086/".into(),
            "web".into(),
            String::new(),
            String::new(),
            namespace.into(),
        )
    }

    #[test]
    fn write_url_is_normalised() {
        assert_eq!(sink("").write_url, "http://localhost:8086/write");
    }

    #[test]
    fn encodes_counters_and_timers() {
        let registry = Registry::new();
        registry.counter("request_total/GET/items/:id").unwrap().inc(42);
        registry
            .timer("request_duration/all")
            .unwrap()
            .update(std::time::Duration::from_millis(5));

        let snapshot = registry.snapshot();
        let ts = snapshot.taken_at.timestamp_nanos_opt().unwrap();
        let body = sink("api.").encode(&snapshot);
        let lines: Vec<&str> = body.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("api.request_duration/all.timer count=1i,"));
        assert!(lines[0].ends_with(&format!(" {ts}")));
        assert_eq!(
            lines[1],
            format!("api.request_total/GET/items/:id.count value=42i {ts}")
        );
    }

    #[test]
    fn escapes_measurement_names() {
        assert_eq!(escape("a b,c"), "a\\ b\\,c");
    }

    #[test]
    fn non_finite_gauges_are_skipped() {
        let registry = Registry::new();
        registry.gauge_f64("load").unwrap().update(f64::NAN);
        registry.gauge_f64("ratio").unwrap().update(f64::INFINITY);
        registry.gauge_f64("temp").unwrap().update(21.5);
        registry.counter("request_total/all").unwrap().inc(1);

        let snapshot = registry.snapshot();
        let ts = snapshot.taken_at.timestamp_nanos_opt().unwrap();
        let body = sink("").encode(&snapshot);

        assert_eq!(
            body.lines().collect::<Vec<_>>(),
            [
                format!("request_total/all.count value=1i {ts}"),
                format!("temp.gauge value=21.5 {ts}"),
            ]
        );
    }
}
