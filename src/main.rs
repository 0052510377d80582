use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum_monitor::config::AppConfig;
use axum_monitor::server::{self, AppState};
use axum_monitor::{logging, Monitor};
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(error) = run().await {
        tracing::error!(%error, "server exited with error");
        std::process::exit(1);
    }
}

async fn run() -> axum_monitor::Result<()> {
    // ── 1. Load configuration ────────────────────────────────────
    let path = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("AXUM_MONITOR_CONFIG"))
        .map(PathBuf::from);
    let config = AppConfig::load(path.as_deref())?;

    // ── 2. Build the monitor ─────────────────────────────────────
    let monitor = Arc::new(Monitor::new(&config.monitor)?);
    tracing::info!(
        slow_threshold_ms = config.monitor.slow_threshold_ms,
        visitor_filter_bytes = monitor.visitors().memory_bytes(),
        visitor_filter_hashes = monitor.visitors().hash_count(),
        "monitor ready"
    );

    // ── 3. Start reporters ───────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reporters = monitor.start_reporters(&config.reporters, &shutdown_rx)?;

    // ── 4. Build Axum router ─────────────────────────────────────
    let app = server::create_router(Arc::new(AppState::new(monitor)));

    // ── 5. Bind & serve ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown requested");
    })
    .await?;

    // ── 6. Flush reporters ───────────────────────────────────────
    let _ = shutdown_tx.send(true);
    for handle in reporters {
        // A reporter that panicked has nothing left to flush.
        let _ = handle.await;
    }

    Ok(())
}
