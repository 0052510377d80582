//! The per-process instrumentation facility.
//!
//! A [`Monitor`] owns the metric registry, the unique-visitor filter and the
//! slow-request threshold. Build one at startup, wrap it in an `Arc` and hand
//! it to whatever wires up request handling; tests are free to build several.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::bloom::BloomFilter;
use crate::config::MonitorConfig;
use crate::error::Result;
use crate::metrics::{
    Counter, Gauge, GaugeFloat64, Histogram, Instrument, Meter, Registry, RegistrySnapshot, Timer,
};

/// Stable metric names exported by the request interceptor.
pub mod names {
    pub const REQUEST_TOTAL: &str = "request_total";
    pub const REQUEST_FAIL_TOTAL: &str = "request_fail_total";
    pub const REQUEST_UV_TOTAL: &str = "request_uv_total";
    pub const REQUEST_BODY_TOTAL: &str = "request_body_total";
    pub const RESPONSE_BODY_TOTAL: &str = "response_body_total";
    pub const REQUEST_DURATION: &str = "request_duration";
    pub const SLOW_REQUEST_TOTAL: &str = "slow_request_total";

    /// `{family}/all`
    pub fn all(family: &str) -> String {
        format!("{family}/all")
    }

    /// `{family}/{METHOD}{ROUTE}`, e.g. `request_total/GET/items/:id`.
    pub fn per_route(family: &str, method: &str, route: &str) -> String {
        format!("{family}/{method}{route}")
    }
}

pub const DEFAULT_SLOW_THRESHOLD_MS: u64 = 200;

/// What the interceptor learned about one finished request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestObservation {
    pub method: String,
    /// Matched route template such as `/items/:id`; `None` when nothing matched.
    pub route: Option<String>,
    /// Resolved client address; `None` when the framework could not tell.
    pub client: Option<String>,
    /// Request body length; negative means unknown.
    pub request_size: i64,
    pub status: u16,
    /// Response body length; zero or negative means empty or unknown.
    pub response_size: i64,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct Monitor {
    registry: Arc<Registry>,
    visitors: BloomFilter,
    slow_threshold_ms: AtomicU64,
    trust_proxy_headers: bool,
}

impl Monitor {
    /// A monitor over a fresh registry.
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        Self::with_registry(config, Arc::new(Registry::new()))
    }

    /// A monitor reporting into an existing registry.
    pub fn with_registry(config: &MonitorConfig, registry: Arc<Registry>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            visitors: BloomFilter::new(config.expected_visitors, config.false_positive_rate)?,
            slow_threshold_ms: AtomicU64::new(config.slow_threshold_ms),
            trust_proxy_headers: config.trust_proxy_headers,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn visitors(&self) -> &BloomFilter {
        &self.visitors
    }

    pub fn trust_proxy_headers(&self) -> bool {
        self.trust_proxy_headers
    }

    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_threshold_ms.load(Ordering::Relaxed))
    }

    /// Changes the slow-request threshold; takes effect for the next request.
    pub fn set_slow_threshold(&self, threshold: Duration) {
        let ms = u64::try_from(threshold.as_millis()).unwrap_or(u64::MAX);
        self.slow_threshold_ms.store(ms, Ordering::Relaxed);
    }

    pub fn counter(&self, name: &str) -> Result<Counter> {
        self.registry.counter(name)
    }

    pub fn gauge(&self, name: &str) -> Result<Gauge> {
        self.registry.gauge(name)
    }

    pub fn gauge_f64(&self, name: &str) -> Result<GaugeFloat64> {
        self.registry.gauge_f64(name)
    }

    pub fn meter(&self, name: &str) -> Result<Meter> {
        self.registry.meter(name)
    }

    pub fn histogram(&self, name: &str) -> Result<Histogram> {
        self.registry.histogram(name)
    }

    pub fn timer(&self, name: &str) -> Result<Timer> {
        self.registry.timer(name)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.registry.snapshot()
    }

    /// Folds one finished request into the metrics.
    ///
    /// Never fails: unknown sizes and a missing route simply skip the metrics
    /// that need them, and a name registered under another kind is logged and
    /// skipped.
    pub fn observe(&self, req: &RequestObservation) {
        use names::*;

        if let Some(client) = req.client.as_deref() {
            // Check-then-insert races may double count a brand-new client.
            if !self.visitors.contains(client) {
                self.visitors.insert(client);
                self.with(REQUEST_UV_TOTAL, |c: Counter| c.inc(1));
            }
        }

        let route_name =
            |family: &str| req.route.as_deref().map(|r| per_route(family, &req.method, r));

        self.with(&all(REQUEST_TOTAL), |c: Counter| c.inc(1));
        if let Some(name) = route_name(REQUEST_TOTAL) {
            self.with(&name, |c: Counter| c.inc(1));
        }

        if req.status >= 400 {
            self.with(&all(REQUEST_FAIL_TOTAL), |c: Counter| c.inc(1));
            if let Some(name) = route_name(REQUEST_FAIL_TOTAL) {
                self.with(&name, |c: Counter| c.inc(1));
            }
        }

        if req.request_size >= 0 {
            self.with(REQUEST_BODY_TOTAL, |c: Counter| c.inc(req.request_size));
        }

        if req.elapsed.as_millis() > u128::from(self.slow_threshold_ms.load(Ordering::Relaxed)) {
            self.with(SLOW_REQUEST_TOTAL, |c: Counter| c.inc(1));
        }

        self.with(&all(REQUEST_DURATION), |t: Timer| t.update(req.elapsed));
        if let Some(name) = route_name(REQUEST_DURATION) {
            self.with(&name, |t: Timer| t.update(req.elapsed));
        }

        if req.response_size > 0 {
            self.with(RESPONSE_BODY_TOTAL, |c: Counter| c.inc(req.response_size));
        }
    }

    fn with<I: Instrument + Default>(&self, name: &str, apply: impl FnOnce(I)) {
        match self.registry.get_or_register(name, I::default) {
            Ok(instrument) => apply(instrument),
            Err(error) => tracing::warn!(%error, "skipping request metric"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> Monitor {
        Monitor::new(&MonitorConfig {
            expected_visitors: 1_000,
            ..MonitorConfig::default()
        })
        .unwrap()
    }

    fn get_item(client: &str) -> RequestObservation {
        RequestObservation {
            method: "GET".into(),
            route: Some("/items/:id".into()),
            client: Some(client.into()),
            request_size: 120,
            status: 200,
            response_size: 340,
            elapsed: Duration::from_millis(50),
        }
    }

    #[test]
    fn threshold_is_runtime_mutable() {
        let m = monitor();
        assert_eq!(m.slow_threshold(), Duration::from_millis(DEFAULT_SLOW_THRESHOLD_MS));
        m.set_slow_threshold(Duration::from_millis(20));
        m.observe(&get_item("10.0.0.1"));
        assert_eq!(m.snapshot().count(names::SLOW_REQUEST_TOTAL), 1);
    }

    #[test]
    fn exact_threshold_is_not_slow() {
        let m = monitor();
        m.observe(&RequestObservation {
            elapsed: Duration::from_millis(200),
            ..get_item("10.0.0.1")
        });
        assert_eq!(m.snapshot().count(names::SLOW_REQUEST_TOTAL), 0);
    }

    #[test]
    fn unmatched_route_only_counts_globally() {
        let m = monitor();
        m.observe(&RequestObservation {
            route: None,
            status: 404,
            ..get_item("10.0.0.1")
        });

        let snap = m.snapshot();
        assert_eq!(snap.count("request_total/all"), 1);
        assert_eq!(snap.count("request_fail_total/all"), 1);
        assert!(snap.metrics.keys().all(|k| !k.contains("GET")));
    }

    #[test]
    fn unknown_client_skips_visitor_count() {
        let m = monitor();
        m.observe(&RequestObservation {
            client: None,
            ..get_item("unused")
        });
        assert!(m.snapshot().get(names::REQUEST_UV_TOTAL).is_none());
    }

    #[test]
    fn conflicting_registration_does_not_break_observe() {
        let m = monitor();
        m.timer(names::REQUEST_BODY_TOTAL).unwrap();
        m.observe(&get_item("10.0.0.1"));

        let snap = m.snapshot();
        assert_eq!(snap.count("request_total/all"), 1);
        assert!(snap.get(names::REQUEST_BODY_TOTAL).unwrap().as_timer().is_some());
    }

    #[test]
    fn injected_registry_is_shared() {
        let registry = Arc::new(Registry::new());
        let m = Monitor::with_registry(&MonitorConfig::default(), Arc::clone(&registry)).unwrap();
        m.observe(&get_item("10.0.0.1"));
        assert_eq!(registry.counter("request_total/all").unwrap().count(), 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = MonitorConfig {
            false_positive_rate: 0.0,
            ..MonitorConfig::default()
        };
        assert!(Monitor::new(&config).is_err());
    }
}
