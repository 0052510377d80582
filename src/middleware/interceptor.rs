use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{header, HeaderMap, Method},
    middleware::{self as axum_mw, Next},
    response::Response,
    Router,
};
use http_body::Body as _;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::monitor::{Monitor, RequestObservation};

/// Tower-compatible middleware that feeds every request through
/// [`Monitor::observe`] once the handler has produced its response.
///
/// The response is passed through untouched.
pub async fn track_requests(
    State(monitor): State<Arc<Monitor>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned());
    let client = client_address(&req, monitor.trust_proxy_headers());
    let request_size = request_size(&req);

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = start.elapsed();

    let observation = RequestObservation {
        response_size: response_size(&method, &response),
        method: method.as_str().to_owned(),
        route,
        client,
        request_size,
        status: response.status().as_u16(),
        elapsed,
    };
    tracing::debug!(
        method = %observation.method,
        route = observation.route.as_deref().unwrap_or("-"),
        status = observation.status,
        elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
        "request finished"
    );
    monitor.observe(&observation);

    response
}

impl Monitor {
    /// Installs [`track_requests`] on every route of `router`.
    pub fn instrument<S>(self: &Arc<Self>, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(axum_mw::from_fn_with_state(Arc::clone(self), track_requests))
    }
}

/// Peer address, or the first proxy-reported address when proxies are trusted.
fn client_address(req: &Request, trust_proxy_headers: bool) -> Option<String> {
    if trust_proxy_headers {
        if let Some(ip) = forwarded_client(req.headers()) {
            return Some(ip);
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

fn forwarded_client(headers: &HeaderMap) -> Option<String> {
    let forwarded_for = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next());
    let real_ip = || headers.get("x-real-ip").and_then(|v| v.to_str().ok());

    forwarded_for
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| real_ip().map(str::trim).filter(|ip| !ip.is_empty()))
        .map(str::to_owned)
}

/// Declared body length, -1 when neither the header nor the body knows it.
fn request_size(req: &Request) -> i64 {
    content_length(req.headers())
        .or_else(|| req.body().size_hint().exact())
        .and_then(|n| i64::try_from(n).ok())
        .unwrap_or(-1)
}

/// Bytes the response body will carry, 0 for streamed bodies of unknown length.
/// Responses to `HEAD` carry no body whatever the size hint says.
fn response_size(method: &Method, response: &Response) -> i64 {
    if method == Method::HEAD {
        return 0;
    }
    response
        .body()
        .size_hint()
        .exact()
        .or_else(|| content_length(response.headers()))
        .and_then(|n| i64::try_from(n).ok())
        .unwrap_or(0)
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
