//! End-to-end: the demo router served over TCP with the monitor installed.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use axum_monitor::config::MonitorConfig;
use axum_monitor::server::{create_router, AppState};
use axum_monitor::Monitor;

async fn serve(monitor: Arc<Monitor>) -> (String, tokio::task::JoinHandle<()>) {
    serve_router(create_router(Arc::new(AppState::new(monitor)))).await
}

async fn serve_router(app: Router) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    (format!("http://{addr}"), handle)
}

#[tokio::test]
async fn requests_are_counted_per_route() {
    let monitor = Arc::new(Monitor::new(&MonitorConfig::default()).unwrap());
    let (base, server) = serve(Arc::clone(&monitor)).await;
    let client = reqwest::Client::new();

    let body = r#"{"name":"widget","price":1299}"#;
    let created = client
        .post(format!("{base}/api/items"))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);

    let found = client.get(format!("{base}/api/items/1")).send().await.unwrap();
    assert_eq!(found.status(), 200);
    let found_len = found.bytes().await.unwrap().len() as i64;

    let missing = client.get(format!("{base}/api/items/99")).send().await.unwrap();
    assert_eq!(missing.status(), 404);

    let snap = monitor.snapshot();
    assert_eq!(snap.count("request_total/all"), 3);
    assert_eq!(snap.count("request_total/POST/api/items"), 1);
    assert_eq!(snap.count("request_total/GET/api/items/:id"), 2);
    assert_eq!(snap.count("request_fail_total/all"), 1);
    assert_eq!(snap.count("request_fail_total/GET/api/items/:id"), 1);
    assert_eq!(snap.count("request_uv_total"), 1);
    assert_eq!(snap.count("request_body_total"), body.len() as i64);
    assert!(snap.count("response_body_total") > found_len);
    assert!(snap.get("request_duration/GET/api/items/:id").is_some());

    server.abort();
}

#[tokio::test]
async fn forwarded_clients_are_distinct_visitors_when_trusted() {
    let config = MonitorConfig {
        trust_proxy_headers: true,
        ..MonitorConfig::default()
    };
    let monitor = Arc::new(Monitor::new(&config).unwrap());
    let (base, server) = serve(Arc::clone(&monitor)).await;
    let client = reqwest::Client::new();

    for ip in ["203.0.113.1", "203.0.113.2", "203.0.113.1"] {
        let res = client
            .get(format!("{base}/api/items"))
            .header("x-forwarded-for", ip)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
    }

    let snap = monitor.snapshot();
    assert_eq!(snap.count("request_uv_total"), 2);
    assert_eq!(snap.count("request_total/GET/api/items"), 3);

    server.abort();
}

#[tokio::test]
async fn metrics_endpoint_serves_snapshot() {
    let monitor = Arc::new(Monitor::new(&MonitorConfig::default()).unwrap());
    let (base, server) = serve(Arc::clone(&monitor)).await;
    let client = reqwest::Client::new();

    client.get(format!("{base}/api/items")).send().await.unwrap();
    let text = client
        .get(format!("{base}/api/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        json["metrics"]["request_total/GET/api/items"],
        serde_json::json!({ "kind": "counter", "count": 1 })
    );
    assert!(json["taken_at"].is_string());

    server.abort();
}

fn hello() -> Router {
    Router::new().route("/hello", get(|| async { "hello" }))
}

#[tokio::test]
async fn instrumented_responses_are_unchanged() {
    let monitor = Arc::new(Monitor::new(&MonitorConfig::default()).unwrap());
    let (plain, plain_server) = serve_router(hello()).await;
    let (watched, watched_server) = serve_router(monitor.instrument(hello())).await;
    let client = reqwest::Client::new();

    let a = client.get(format!("{plain}/hello")).send().await.unwrap();
    let b = client.get(format!("{watched}/hello")).send().await.unwrap();

    assert_eq!(a.status(), b.status());
    let mut names_a: Vec<_> = a.headers().keys().map(|k| k.as_str().to_owned()).collect();
    let mut names_b: Vec<_> = b.headers().keys().map(|k| k.as_str().to_owned()).collect();
    names_a.sort();
    names_b.sort();
    assert_eq!(names_a, names_b);
    assert_eq!(a.headers()["content-length"], b.headers()["content-length"]);
    assert_eq!(a.text().await.unwrap(), b.text().await.unwrap());
    assert_eq!(monitor.snapshot().count("request_total/GET/hello"), 1);

    plain_server.abort();
    watched_server.abort();
}

#[tokio::test]
async fn head_requests_count_no_response_bytes() {
    let monitor = Arc::new(Monitor::new(&MonitorConfig::default()).unwrap());
    let (base, server) = serve_router(monitor.instrument(hello())).await;
    let client = reqwest::Client::new();

    let res = client.head(format!("{base}/hello")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    let snap = monitor.snapshot();
    assert_eq!(snap.count("request_total/HEAD/hello"), 1);
    assert!(snap.get("response_body_total").is_none());

    server.abort();
}
