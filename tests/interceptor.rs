//! Request accounting through `Monitor::observe`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use axum_monitor::config::MonitorConfig;
use axum_monitor::metrics::MetricValue;
use axum_monitor::{Monitor, RequestObservation};

fn monitor() -> Monitor {
    Monitor::new(&MonitorConfig::default()).unwrap()
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
fn first_request_from_new_client() {
    let m = monitor();
    m.observe(&get_item("198.51.100.4"));

    let snap = m.snapshot();
    assert_eq!(snap.count("request_total/all"), 1);
    assert_eq!(snap.count("request_total/GET/items/:id"), 1);
    assert_eq!(snap.count("request_uv_total"), 1);
    assert_eq!(snap.count("request_body_total"), 120);
    assert_eq!(snap.count("response_body_total"), 340);
    assert_eq!(snap.count("slow_request_total"), 0);
    assert_eq!(snap.count("request_fail_total/all"), 0);
    assert!(snap.get("slow_request_total").is_none());
    assert!(snap.get("request_fail_total/all").is_none());

    for name in ["request_duration/all", "request_duration/GET/items/:id"] {
        let timer = snap.get(name).and_then(MetricValue::as_timer).unwrap();
        assert_eq!(timer.durations_us.count, 1, "{name}");
        assert!((timer.durations_us.p50 - 50_000.0).abs() < 50.0, "{name}");
    }
}

#[test]
fn repeat_client_is_not_a_new_visitor() {
    let m = monitor();
    m.observe(&get_item("198.51.100.4"));
    m.observe(&get_item("198.51.100.4"));

    let snap = m.snapshot();
    assert_eq!(snap.count("request_uv_total"), 1);
    assert_eq!(snap.count("request_total/all"), 2);
    assert_eq!(snap.count("request_total/GET/items/:id"), 2);

    m.observe(&get_item("198.51.100.5"));
    assert_eq!(m.snapshot().count("request_uv_total"), 2);
}

#[test]
fn server_errors_count_as_failures() {
    let m = monitor();
    m.observe(&RequestObservation {
        status: 500,
        ..get_item("198.51.100.4")
    });

    let snap = m.snapshot();
    assert_eq!(snap.count("request_fail_total/all"), 1);
    assert_eq!(snap.count("request_fail_total/GET/items/:id"), 1);
    assert_eq!(snap.count("request_total/all"), 1);
    assert_eq!(snap.count("request_total/GET/items/:id"), 1);
}

#[test]
fn client_errors_count_as_failures() {
    let m = monitor();
    m.observe(&RequestObservation {
        status: 400,
        ..get_item("198.51.100.4")
    });
    m.observe(&RequestObservation {
        status: 399,
        ..get_item("198.51.100.4")
    });
    assert_eq!(m.snapshot().count("request_fail_total/all"), 1);
}

#[test]
fn slow_requests_cross_threshold() {
    let m = monitor();
    m.observe(&RequestObservation {
        elapsed: Duration::from_millis(250),
        ..get_item("198.51.100.4")
    });
    assert_eq!(m.snapshot().count("slow_request_total"), 1);
}

#[test]
fn unknown_request_length_is_skipped() {
    let m = monitor();
    m.observe(&RequestObservation {
        request_size: -1,
        response_size: 0,
        ..get_item("198.51.100.4")
    });

    let snap = m.snapshot();
    assert!(snap.get("request_body_total").is_none());
    assert!(snap.get("response_body_total").is_none());
    assert_eq!(snap.count("request_total/all"), 1);
}

#[test]
fn per_route_metrics_split_by_method() {
    let m = monitor();
    m.observe(&get_item("198.51.100.4"));
    m.observe(&RequestObservation {
        method: "POST".into(),
        route: Some("/items".into()),
        ..get_item("198.51.100.4")
    });

    let snap = m.snapshot();
    assert_eq!(snap.count("request_total/GET/items/:id"), 1);
    assert_eq!(snap.count("request_total/POST/items"), 1);
    assert_eq!(snap.count("request_total/all"), 2);
}

#[test]
fn concurrent_requests_lose_no_updates() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 250;
    let m = Arc::new(monitor());

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    m.observe(&get_item(&format!("10.{t}.{}.{}", i / 256, i % 256)));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let total = (THREADS * PER_THREAD) as i64;
    let snap = m.snapshot();
    assert_eq!(snap.count("request_total/all"), total);
    assert_eq!(snap.count("request_total/GET/items/:id"), total);
    assert_eq!(snap.count("request_body_total"), total * 120);
    // Distinct clients, so only false positives could lower this.
    let uv = snap.count("request_uv_total");
    assert!(uv <= total && uv >= total - 5, "uv = {uv}");

    let timer = snap.get("request_duration/all").and_then(MetricValue::as_timer).unwrap();
    assert_eq!(timer.durations_us.count, total as u64);
}

#[test]
fn concurrent_get_or_register_converges() {
    let m = Arc::new(monitor());
    let handles: Vec<_> = (1..=16i64)
        .map(|delta| {
            let m = Arc::clone(&m);
            thread::spawn(move || m.counter("fresh").unwrap().inc(delta))
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(m.counter("fresh").unwrap().count(), (1..=16).sum::<i64>());
    assert_eq!(m.registry().names(), ["fresh"]);
}
