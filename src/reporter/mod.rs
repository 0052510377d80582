//! Periodic export of registry snapshots.
//!
//! A [`Reporter`] runs on its own task: every `interval` it snapshots the
//! registry and hands the snapshot to a [`Sink`]. A failed or slow export is
//! logged and retried on the next tick; request handling never waits on it.

pub mod influx;
pub mod log;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::{ReporterConfig, SinkConfig};
use crate::error::Result;
use crate::metrics::{Registry, RegistrySnapshot};
use crate::monitor::Monitor;

pub use self::influx::InfluxSink;
pub use self::log::LogSink;
pub use self::redis::RedisSink;

/// Destination for registry snapshots.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short name used in log events.
    fn name(&self) -> &'static str;

    async fn export(&self, snapshot: &RegistrySnapshot) -> Result<()>;
}

#[async_trait]
impl<S: Sink + ?Sized> Sink for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn export(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        (**self).export(snapshot).await
    }
}

/// Builds the sink described by `config`. Nothing connects here: a sink whose
/// server is down fails its exports and retries on the next tick.
pub fn sink_from_config(config: &SinkConfig) -> Result<Box<dyn Sink>> {
    let sink: Box<dyn Sink> = match config {
        SinkConfig::Log => Box::new(LogSink::new()),
        SinkConfig::Influx {
            url,
            database,
            username,
            password,
            namespace,
        } => Box::new(InfluxSink::new(
            url.clone(),
            database.clone(),
            username.clone(),
            password.clone(),
            namespace.clone(),
        )),
        SinkConfig::Redis { url, namespace } => Box::new(RedisSink::new(url, namespace.clone())?),
    };
    Ok(sink)
}

pub struct Reporter<S> {
    registry: Arc<Registry>,
    sink: S,
    interval: Duration,
}

impl<S: Sink + 'static> Reporter<S> {
    pub fn new(registry: Arc<Registry>, sink: S, interval: Duration) -> Self {
        Self {
            registry,
            sink,
            interval,
        }
    }

    /// Snapshots the registry and exports it once.
    ///
    /// An export that outlives one interval is abandoned with a timeout error.
    pub async fn report_once(&self) -> Result<()> {
        let snapshot = self.registry.snapshot();
        match tokio::time::timeout(self.interval, self.sink.export(&snapshot)).await {
            Ok(result) => result,
            Err(elapsed) => Err(std::io::Error::new(std::io::ErrorKind::TimedOut, elapsed).into()),
        }
    }

    /// Reports every `interval` until `shutdown` turns true or its sender is
    /// dropped, then flushes one final snapshot.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            sink = self.sink.name(),
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "reporter started"
        );

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.tick().await;
        tracing::info!(sink = self.sink.name(), "reporter stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn tick(&self) {
        if let Err(error) = self.report_once().await {
            tracing::warn!(
                sink = self.sink.name(),
                %error,
                "metrics export failed, retrying next interval"
            );
        }
    }
}

impl Monitor {
    /// Starts a background task exporting this monitor's registry to `sink`
    /// every `interval` until `shutdown` fires.
    pub fn report_periodically<S: Sink + 'static>(
        &self,
        sink: S,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        Reporter::new(Arc::clone(self.registry()), sink, interval).spawn(shutdown)
    }

    /// Starts one reporter per configured sink. Only a malformed sink address
    /// is an error; unreachable servers are retried by the reporter.
    pub fn start_reporters(
        &self,
        configs: &[ReporterConfig],
        shutdown: &watch::Receiver<bool>,
    ) -> Result<Vec<JoinHandle<()>>> {
        let mut handles = Vec::with_capacity(configs.len());
        for config in configs {
            let sink = sink_from_config(&config.sink)?;
            handles.push(self.report_periodically(
                sink,
                Duration::from_secs(config.interval_secs),
                shutdown.clone(),
            ));
        }
        Ok(handles)
    }
}
