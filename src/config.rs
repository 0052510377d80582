//! Runtime configuration.
//!
//! Everything has a default, so an empty JSON object (or no file at all) is a
//! valid configuration.

use std::path::Path;

use serde::Deserialize;

use crate::error::{MonitorError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default = "default_reporters")]
    pub reporters: Vec<ReporterConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Requests slower than this many milliseconds count as slow.
    #[serde(default = "default_slow_threshold_ms")]
    pub slow_threshold_ms: u64,

    /// Distinct clients the visitor filter is sized for.
    #[serde(default = "default_expected_visitors")]
    pub expected_visitors: usize,

    /// Target false-positive rate of the visitor filter at `expected_visitors`.
    #[serde(default = "default_false_positive_rate")]
    pub false_positive_rate: f64,

    /// Take the client address from `X-Forwarded-For` / `X-Real-IP` when present.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReporterConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(flatten)]
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    Log,
    Influx {
        url: String,
        database: String,
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: String,
        #[serde(default)]
        namespace: String,
    },
    Redis {
        url: String,
        #[serde(default = "default_redis_namespace")]
        namespace: String,
    },
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".into()
}
fn default_reporters() -> Vec<ReporterConfig> {
    vec![ReporterConfig {
        interval_secs: default_interval_secs(),
        sink: SinkConfig::Log,
    }]
}
fn default_slow_threshold_ms() -> u64 {
    200
}
fn default_expected_visitors() -> usize {
    crate::bloom::DEFAULT_EXPECTED_INSERTIONS
}
fn default_false_positive_rate() -> f64 {
    crate::bloom::DEFAULT_FP_RATE
}
fn default_interval_secs() -> u64 {
    10
}
fn default_redis_namespace() -> String {
    "axum_monitor".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            monitor: MonitorConfig::default(),
            reporters: default_reporters(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            slow_threshold_ms: default_slow_threshold_ms(),
            expected_visitors: default_expected_visitors(),
            false_positive_rate: default_false_positive_rate(),
            trust_proxy_headers: false,
        }
    }
}

impl AppConfig {
    /// Reads a JSON config file, or returns the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                Self::from_json(&raw)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.monitor.validate()?;
        for reporter in &self.reporters {
            if reporter.interval_secs == 0 {
                return Err(MonitorError::Config(
                    "reporter interval_secs must be greater than zero".into(),
                ));
            }
        }
        Ok(())
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.expected_visitors == 0 {
            return Err(MonitorError::Config(
                "expected_visitors must be greater than zero".into(),
            ));
        }
        if !(self.false_positive_rate > 0.0 && self.false_positive_rate < 1.0) {
            return Err(MonitorError::Config(format!(
                "false_positive_rate {} must be between 0 and 1",
                self.false_positive_rate
            )));
        }
        crate::bloom::params::optimal_bit_count(
            self.expected_visitors,
            self.false_positive_rate,
        )?;
        Ok(())
    }
}
