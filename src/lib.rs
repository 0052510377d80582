//! Request instrumentation for axum services.
//!
//! A [`Monitor`] sits in front of the router, times every request and keeps a
//! fixed family of metrics up to date: request and failure totals (global and
//! per `METHOD+route`), approximate unique visitors, request/response body
//! bytes, slow requests and duration timers. [`reporter`] ships snapshots of
//! those metrics to a log, InfluxDB or Redis on a fixed interval.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use axum::{routing::get, Router};
//! use axum_monitor::{config::MonitorConfig, reporter::LogSink, Monitor};
//!
//! # async fn run() -> axum_monitor::Result<()> {
//! let monitor = Arc::new(Monitor::new(&MonitorConfig::default())?);
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! monitor.report_periodically(LogSink::new(), Duration::from_secs(10), shutdown_rx);
//!
//! let app = monitor.instrument(Router::<()>::new().route("/items/:id", get(|| async { "ok" })));
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

pub mod bloom;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod monitor;
pub mod reporter;
pub mod server;

pub use bloom::BloomFilter;
pub use error::{MonitorError, Result};
pub use metrics::{Registry, RegistrySnapshot};
pub use monitor::{Monitor, RequestObservation};
