use axum::{
    routing::get,
    Router,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers::{self, items::Item};
use crate::monitor::Monitor;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Written by the middleware, read by `/api/metrics`.
    pub monitor: Arc<Monitor>,

    /// In-memory item store backing the demo API.
    pub items: RwLock<HashMap<u64, Item>>,

    pub next_id: AtomicU64,
}

impl AppState {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self {
            monitor,
            items: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

/// Builds the full Axum `Router` with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    let monitor = Arc::clone(&state.monitor);

    let router = Router::new()
        // ── Item endpoints ──────────────────────────────────────
        .route(
            "/api/items",
            get(handlers::items::list_items).post(handlers::items::create_item),
        )
        .route("/api/items/:id", get(handlers::items::get_item))
        // ── Metrics ─────────────────────────────────────────────
        .route("/api/metrics", get(handlers::metrics::get_metrics))
        .route("/api/metrics/stream", get(handlers::metrics::metrics_stream))
        // ── Provide shared state to all routes above ────────────
        .with_state(state);

    // ── Global middleware (applied bottom-up) ───────────────────
    monitor
        .instrument(router)
        .layer(CorsLayer::permissive())
}
